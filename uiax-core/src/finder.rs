//! The [`Finder`]: entry point that owns the platform adapter.
//!
//! A finder resolves applications and focus, and runs selector queries over
//! the element tree.  Every element it hands out keeps only a weak link to
//! the adapter, so [`Finder::close`] (or dropping the finder) invalidates
//! them all at once: later actions fail with `InvalidElement`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use uiax_core::{CancelToken, Finder, Role, Selector};
//!
//! let finder = Finder::new()?;
//! let cancel = CancelToken::new();
//! let ok = finder.wait_for(
//!     &Selector::and([Selector::by_role(Role::Button), Selector::by_name("OK")]),
//!     Duration::from_secs(5),
//!     &cancel,
//! )?;
//! ok.perform_action("AXPress")?;
//! # Ok::<(), uiax_core::UiaxError>(())
//! ```

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::cancel::CancelToken;
use crate::config::FinderConfig;
use crate::element::Element;
use crate::errors::UiaxError;
use crate::platform::{self, Adapter, NativeElement};
use crate::process;
use crate::selector::Selector;
use crate::tree;

/// Fixed delay between `wait_for` attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Attribute key for the executable name added to application elements.
pub const PROCESS_NAME_ATTRIBUTE: &str = "process_name";

/// Owner of one platform adapter and the queries that run over it.
pub struct Finder {
    adapter: RwLock<Option<Arc<dyn Adapter>>>,
    config: FinderConfig,
}

impl Finder {
    /// Connect with the default configuration.
    pub fn new() -> Result<Self, UiaxError> {
        Self::with_config(FinderConfig::default())
    }

    /// Connect the registered (or native) adapter with `config`.
    pub fn with_config(config: FinderConfig) -> Result<Self, UiaxError> {
        let adapter = platform::connect(&config)?;
        log::debug!("finder connected to {} backend", adapter.backend());
        Ok(Self::with_adapter(adapter, config))
    }

    /// Wrap an already constructed adapter.
    pub fn with_adapter(adapter: Arc<dyn Adapter>, config: FinderConfig) -> Self {
        Self {
            adapter: RwLock::new(Some(adapter)),
            config,
        }
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Backend identifier, or `None` once closed.
    pub fn backend(&self) -> Option<&'static str> {
        self.adapter.read().as_ref().map(|a| a.backend())
    }

    pub fn is_closed(&self) -> bool {
        self.adapter.read().is_none()
    }

    /// Release the adapter.  Idempotent; a second call is a no-op.
    pub fn close(&self) -> Result<(), UiaxError> {
        let mut slot = self.adapter.write();
        if let Some(adapter) = slot.as_ref() {
            adapter.close()?;
            log::debug!("finder closed {} backend", adapter.backend());
        }
        *slot = None;
        Ok(())
    }

    fn adapter(&self) -> Result<Arc<dyn Adapter>, UiaxError> {
        self.adapter.read().clone().ok_or_else(UiaxError::closed)
    }

    // -----------------------------------------------------------------------
    // Application and focus queries
    // -----------------------------------------------------------------------

    /// The synthetic cross-application root.
    pub fn root(&self) -> Result<Arc<Element>, UiaxError> {
        let adapter = self.adapter()?;
        let native = adapter.root()?;
        Ok(Element::from_native(native, None, &adapter, true))
    }

    pub fn focused_application(&self) -> Result<Arc<Element>, UiaxError> {
        let adapter = self.adapter()?;
        let native = adapter.focused_application()?;
        Ok(self.wrap_application(native, &adapter))
    }

    pub fn focused_element(&self) -> Result<Arc<Element>, UiaxError> {
        let adapter = self.adapter()?;
        let native = adapter.focused_element()?;
        Ok(Element::from_native(native, None, &adapter, false))
    }

    pub fn application_by_pid(&self, pid: u32) -> Result<Arc<Element>, UiaxError> {
        let adapter = self.adapter()?;
        let native = adapter.application_by_pid(pid)?;
        Ok(self.wrap_application(native, &adapter))
    }

    /// ASCII-case-insensitive match on name or title.
    pub fn application_by_name(&self, name: &str) -> Result<Arc<Element>, UiaxError> {
        let adapter = self.adapter()?;
        let native = adapter.application_by_name(name)?;
        Ok(self.wrap_application(native, &adapter))
    }

    pub fn all_applications(&self) -> Result<Vec<Arc<Element>>, UiaxError> {
        let adapter = self.adapter()?;
        let apps = adapter.all_applications()?;
        Ok(apps
            .into_iter()
            .map(|native| self.wrap_application(native, &adapter))
            .collect())
    }

    fn wrap_application(&self, mut native: NativeElement, adapter: &Arc<dyn Adapter>) -> Arc<Element> {
        if self.config.annotate_process_names
            && !native.attributes.contains_key(PROCESS_NAME_ATTRIBUTE)
        {
            if let Some(name) = process::process_name(native.pid) {
                native
                    .attributes
                    .insert(PROCESS_NAME_ATTRIBUTE.to_owned(), name.into());
            }
        }
        Element::from_native(native, None, adapter, false)
    }

    // -----------------------------------------------------------------------
    // Selector queries
    // -----------------------------------------------------------------------

    /// First match under the focused application.
    pub fn find(&self, selector: &Selector, cancel: &CancelToken) -> Result<Arc<Element>, UiaxError> {
        self.find_in(None, selector, cancel)
    }

    /// First match under `root`, or under the focused application when
    /// `root` is `None`.  `NotFound` when the walk completes without one.
    pub fn find_in(
        &self,
        root: Option<&Arc<Element>>,
        selector: &Selector,
        cancel: &CancelToken,
    ) -> Result<Arc<Element>, UiaxError> {
        let root = self.resolve_root(root)?;
        tree::find(&root, selector, cancel)?
            .ok_or_else(|| UiaxError::NotFound(format!("no element matches {selector:?}")))
    }

    pub fn find_all(
        &self,
        selector: &Selector,
        cancel: &CancelToken,
    ) -> Result<Vec<Arc<Element>>, UiaxError> {
        self.find_all_in(None, selector, cancel)
    }

    /// Every match in pre-order.  `NotFound` when there is none.
    pub fn find_all_in(
        &self,
        root: Option<&Arc<Element>>,
        selector: &Selector,
        cancel: &CancelToken,
    ) -> Result<Vec<Arc<Element>>, UiaxError> {
        let root = self.resolve_root(root)?;
        let found = tree::find_all(&root, selector, cancel)?;
        if found.is_empty() {
            return Err(UiaxError::NotFound(format!("no element matches {selector:?}")));
        }
        Ok(found)
    }

    pub fn wait_for(
        &self,
        selector: &Selector,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Arc<Element>, UiaxError> {
        self.wait_for_in(None, selector, timeout, cancel)
    }

    /// Poll [`Finder::find_in`] every [`POLL_INTERVAL`] until it matches.
    ///
    /// `NotFound` keeps polling; any other error returns at once.  With
    /// `root = None` each attempt re-resolves the focused application, so
    /// newly appeared windows are seen.  An explicit root is walked as
    /// already loaded: children materialized by an earlier attempt are not
    /// re-read.  Use [`Finder::wait_for_with`] to re-resolve a scoped root.
    pub fn wait_for_in(
        &self,
        root: Option<&Arc<Element>>,
        selector: &Selector,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Arc<Element>, UiaxError> {
        self.poll(timeout, cancel, || self.find_in(root, selector, cancel))
    }

    /// Like [`Finder::wait_for_in`], but `scope` is called on every attempt
    /// to produce a fresh root, e.g. `|| finder.application_by_pid(pid)`.
    ///
    /// A `NotFound` from `scope` keeps polling, so the application itself
    /// may also appear late.
    pub fn wait_for_with<F>(
        &self,
        mut scope: F,
        selector: &Selector,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Arc<Element>, UiaxError>
    where
        F: FnMut() -> Result<Arc<Element>, UiaxError>,
    {
        self.poll(timeout, cancel, || {
            let root = scope()?;
            self.find_in(Some(&root), selector, cancel)
        })
    }

    fn poll<F>(&self, timeout: Duration, cancel: &CancelToken, mut attempt: F) -> Result<Arc<Element>, UiaxError>
    where
        F: FnMut() -> Result<Arc<Element>, UiaxError>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            cancel.check()?;
            match attempt() {
                Err(UiaxError::NotFound(_)) => {}
                other => return other,
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(UiaxError::Timeout(timeout));
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
            cancel.check()?;
        }
    }

    fn resolve_root(&self, root: Option<&Arc<Element>>) -> Result<Arc<Element>, UiaxError> {
        match root {
            Some(root) => {
                // A closed finder fails even for detached roots.
                self.adapter()?;
                Ok(Arc::clone(root))
            }
            None => self.focused_application(),
        }
    }
}

impl Drop for Finder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("finder close on drop failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::platform::{register_adapter, unregister_adapter};
    use crate::role::Role;
    use crate::testing::{MockAdapter, MockNode};

    fn config() -> FinderConfig {
        FinderConfig {
            annotate_process_names: false,
            ..FinderConfig::default()
        }
    }

    fn editor() -> MockNode {
        MockNode::new(Role::Application)
            .name("Editor")
            .pid(7)
            .child(
                MockNode::new(Role::Window)
                    .title("notes.txt")
                    .child(MockNode::new(Role::Button).name("Save").action("AXPress"))
                    .child(MockNode::new(Role::TextField).name("Body").focused(true))
                    .child(MockNode::new(Role::Button).name("Close").action("AXPress")),
            )
    }

    fn shell() -> MockNode {
        MockNode::new(Role::Application)
            .name("Terminal")
            .title("zsh")
            .pid(8)
    }

    fn finder_with(mock: MockAdapter) -> (Finder, Arc<MockAdapter>) {
        let mock = Arc::new(mock);
        let adapter: Arc<dyn Adapter> = mock.clone();
        (Finder::with_adapter(adapter, config()), mock)
    }

    fn fixture() -> (Finder, Arc<MockAdapter>) {
        finder_with(MockAdapter::new(vec![editor(), shell()]).with_focused_pid(7))
    }

    #[test]
    fn test_root_is_synthetic() {
        let (finder, _) = fixture();
        let root = finder.root().unwrap();
        assert!(root.is_synthetic_root());
        assert_eq!(root.children().len(), 2);

        let editor = Arc::clone(&root.children()[0]);
        assert!(tree::ancestors(&editor).is_empty());
    }

    #[test]
    fn test_application_queries() {
        let (finder, _) = fixture();
        assert_eq!(finder.focused_application().unwrap().name(), "Editor");
        assert_eq!(finder.application_by_pid(8).unwrap().name(), "Terminal");
        assert_eq!(finder.application_by_name("EDITOR").unwrap().pid(), 7);
        assert_eq!(finder.application_by_name("ZSH").unwrap().pid(), 8);
        assert!(matches!(
            finder.application_by_name("Mail"),
            Err(UiaxError::NotFound(_))
        ));
        assert!(matches!(finder.application_by_pid(99), Err(UiaxError::NotFound(_))));
        assert_eq!(finder.all_applications().unwrap().len(), 2);
    }

    #[test]
    fn test_no_foreground_application() {
        let (finder, _) = finder_with(MockAdapter::new(vec![shell()]));
        assert!(matches!(finder.focused_application(), Err(UiaxError::NotFound(_))));
        assert!(matches!(finder.focused_element(), Err(UiaxError::NoFocus)));
    }

    #[test]
    fn test_focused_element() {
        let (finder, _) = fixture();
        let body = finder.focused_element().unwrap();
        assert_eq!(body.name(), "Body");
        assert!(body.is_focused());
    }

    #[test]
    fn test_process_name_annotation() {
        let me = std::process::id();
        let mock = MockAdapter::new(vec![MockNode::new(Role::Application).name("self").pid(me)]);
        let finder = Finder::with_adapter(mock.into_adapter(), FinderConfig::default());
        let app = finder.application_by_pid(me).unwrap();
        assert!(app.attribute(PROCESS_NAME_ATTRIBUTE).is_some());

        let (plain, _) = fixture();
        let app = plain.application_by_pid(7).unwrap();
        assert!(app.attribute(PROCESS_NAME_ATTRIBUTE).is_none());
    }

    #[test]
    fn test_find_defaults_to_focused_application() {
        let (finder, _) = fixture();
        let cancel = CancelToken::new();
        let save = finder.find(&Selector::by_role(Role::Button), &cancel).unwrap();
        assert_eq!(save.name(), "Save");
        assert_eq!(save.pid(), 7);

        let all = finder.find_all(&Selector::by_role(Role::Button), &cancel).unwrap();
        let names: Vec<_> = all.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["Save", "Close"]);

    }

    #[test]
    fn test_held_root_keeps_ancestry() {
        let (finder, _) = fixture();
        let app = finder.focused_application().unwrap();
        let save = finder
            .find_in(Some(&app), &Selector::by_name("Save"), &CancelToken::new())
            .unwrap();
        let path = tree::path(&save);
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].name(), "Editor");
        assert_eq!(tree::siblings(&save).len(), 2);
    }

    #[test]
    fn test_find_in_scoped_root() {
        let (finder, _) = fixture();
        let cancel = CancelToken::new();
        let shell = finder.application_by_pid(8).unwrap();
        let miss = finder.find_in(Some(&shell), &Selector::by_role(Role::Button), &cancel);
        assert!(matches!(miss, Err(UiaxError::NotFound(_))));
        let miss = finder.find_all_in(Some(&shell), &Selector::by_role(Role::Button), &cancel);
        assert!(matches!(miss, Err(UiaxError::NotFound(_))));
    }

    #[test]
    fn test_actions_reach_adapter() {
        let (finder, mock) = fixture();
        let cancel = CancelToken::new();
        let save = finder.find(&Selector::by_name("Save"), &cancel).unwrap();
        save.perform_action("AXPress").unwrap();
        save.focus().unwrap();
        assert!(matches!(save.perform_action("AXShowMenu"), Err(UiaxError::NotSupported(_))));

        let body = finder.find(&Selector::by_name("Body"), &cancel).unwrap();
        body.set_value("hello").unwrap();

        assert_eq!(mock.action_log(), [("Save".to_owned(), "AXPress".to_owned())]);
        assert_eq!(mock.focus_target().as_deref(), Some("Save"));
        assert_eq!(mock.value_of("Body").as_deref(), Some("hello"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (finder, mock) = fixture();
        let cancel = CancelToken::new();
        let save = finder.find(&Selector::by_name("Save"), &cancel).unwrap();

        assert!(finder.close().is_ok());
        assert!(finder.close().is_ok());
        assert_eq!(mock.close_calls(), 1);
        assert!(finder.is_closed());

        assert!(matches!(finder.root(), Err(UiaxError::InvalidElement(_))));
        assert!(matches!(finder.all_applications(), Err(UiaxError::InvalidElement(_))));
        assert!(matches!(
            finder.find(&Selector::by_name("Save"), &cancel),
            Err(UiaxError::InvalidElement(_))
        ));
        assert!(matches!(save.perform_action("AXPress"), Err(UiaxError::InvalidElement(_))));
    }

    #[test]
    fn test_elements_invalid_after_drop() {
        let mock = MockAdapter::new(vec![editor()]).with_focused_pid(7);
        let counter = mock.live_counter();
        let finder = Finder::with_adapter(mock.into_adapter(), config());
        let save = finder
            .find(&Selector::by_name("Save"), &CancelToken::new())
            .unwrap();
        drop(finder);
        assert!(matches!(save.focus(), Err(UiaxError::InvalidElement(_))));
        drop(save);
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wait_for_timeout_window() {
        let (finder, _) = fixture();
        let timeout = Duration::from_millis(250);
        let start = Instant::now();
        let result = finder.wait_for(&Selector::by_name("Missing"), timeout, &CancelToken::new());
        let elapsed = start.elapsed();
        assert!(matches!(result, Err(UiaxError::Timeout(t)) if t == timeout));
        assert!(elapsed >= timeout, "{elapsed:?}");
        assert!(elapsed <= timeout + POLL_INTERVAL, "{elapsed:?}");
    }

    #[test]
    fn test_wait_for_sees_late_element() {
        let app = editor().child(
            MockNode::new(Role::Sheet)
                .name("Saved")
                .appear_after(Duration::from_millis(150)),
        );
        let (finder, _) = finder_with(MockAdapter::new(vec![app]).with_focused_pid(7));
        let found = finder
            .wait_for(&Selector::by_name("Saved"), Duration::from_secs(2), &CancelToken::new())
            .unwrap();
        assert_eq!(found.role(), Role::Sheet);
    }

    #[test]
    fn test_scoped_wait_re_resolves_application() {
        let app = editor().child(
            MockNode::new(Role::Sheet)
                .name("Saved")
                .appear_after(Duration::from_millis(150)),
        );
        let (finder, _) = finder_with(MockAdapter::new(vec![app]).with_focused_pid(7));
        let selector = Selector::by_name("Saved");
        let cancel = CancelToken::new();

        let held = finder.application_by_pid(7).unwrap();
        let stale = finder.wait_for_in(Some(&held), &selector, Duration::from_millis(300), &cancel);
        assert!(matches!(stale, Err(UiaxError::Timeout(_))));

        let found = finder
            .wait_for_with(|| finder.application_by_pid(7), &selector, Duration::from_secs(2), &cancel)
            .unwrap();
        assert_eq!(found.role(), Role::Sheet);
        assert_eq!(found.pid(), 7);
    }

    #[test]
    fn test_scoped_wait_keeps_polling_for_missing_application() {
        let (finder, _) = fixture();
        let start = Instant::now();
        let result = finder.wait_for_with(
            || finder.application_by_pid(99),
            &Selector::by_name("Save"),
            Duration::from_millis(250),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(UiaxError::Timeout(_))));
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_wait_for_cancelled() {
        let (finder, _) = fixture();
        let cancel = CancelToken::new();
        let trip = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(120));
            trip.cancel();
        });
        let start = Instant::now();
        let result = finder.wait_for(&Selector::by_name("Missing"), Duration::from_secs(5), &cancel);
        handle.join().unwrap();
        assert!(matches!(result, Err(UiaxError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_for_aborts_on_other_errors() {
        let (finder, _) = fixture();
        finder.close().unwrap();
        let start = Instant::now();
        let result = finder.wait_for(&Selector::by_name("Save"), Duration::from_secs(5), &CancelToken::new());
        assert!(matches!(result, Err(UiaxError::InvalidElement(_))));
        assert!(start.elapsed() < POLL_INTERVAL);
    }

    fn mock_constructor(config: &FinderConfig) -> Result<Arc<dyn Adapter>, UiaxError> {
        Ok(MockAdapter::new(vec![editor()])
            .with_config(config)
            .with_focused_pid(7)
            .into_adapter())
    }

    #[test]
    fn test_registered_adapter_is_used() {
        register_adapter(mock_constructor);
        let finder = Finder::with_config(config());
        unregister_adapter();

        let finder = finder.unwrap();
        assert_eq!(finder.backend(), Some("mock"));
        assert_eq!(finder.focused_application().unwrap().name(), "Editor");

        #[cfg(not(any(target_os = "macos", windows)))]
        assert!(matches!(Finder::new(), Err(UiaxError::NotSupported(_))));
    }

    #[test]
    fn test_detached_root_walks() {
        let (finder, _) = fixture();
        let root = Element::builder(Role::Window)
            .child(Element::builder(Role::Button).name("Local"))
            .build();
        let hit = finder
            .find_in(Some(&root), &Selector::by_name("Local"), &CancelToken::new())
            .unwrap();
        assert_eq!(hit.name(), "Local");
    }
}
