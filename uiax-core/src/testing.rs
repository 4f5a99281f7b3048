//! In-memory [`Adapter`] for tests and demos.
//!
//! [`MockAdapter`] serves a fixed forest of [`MockNode`]s through the full
//! adapter contract.  Every handle it hands out bumps a shared live-reference
//! counter that is decremented when the handle drops, so tests can assert
//! that building and dropping elements leaves no reference behind.
//!
//! ```
//! use uiax_core::testing::{MockAdapter, MockNode};
//! use uiax_core::{Finder, FinderConfig, Role, Selector};
//!
//! let app = MockNode::new(Role::Application).name("Editor").pid(7)
//!     .child(MockNode::new(Role::Button).name("Save").action("AXPress"));
//! let mock = MockAdapter::new(vec![app]).with_focused_pid(7);
//! let finder = Finder::with_adapter(mock.into_adapter(), FinderConfig::default());
//! let save = finder.find(&Selector::by_name("Save"), &Default::default()).unwrap();
//! save.perform_action("AXPress").unwrap();
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::FinderConfig;
use crate::errors::UiaxError;
use crate::geometry::Rect;
use crate::platform::{expect_native, Adapter, NativeElement, NativeHandle, NativeRef};
use crate::role::Role;

/// Base of the fake address space; arena index `i` lives at
/// `BASE_ADDRESS + i * 0x10`.
const BASE_ADDRESS: usize = 0x1000;

// ---------------------------------------------------------------------------
// Fixture nodes
// ---------------------------------------------------------------------------

/// One node of a mock UI forest.
#[derive(Debug, Clone)]
pub struct MockNode {
    role: Role,
    name: String,
    title: String,
    value: String,
    description: String,
    bounds: Rect,
    enabled: bool,
    focused: bool,
    selected: bool,
    pid: u32,
    attributes: HashMap<String, serde_json::Value>,
    actions: Vec<String>,
    fail_children: bool,
    appear_after: Option<Duration>,
    children: Vec<MockNode>,
}

impl MockNode {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            name: String::new(),
            title: String::new(),
            value: String::new(),
            description: String::new(),
            bounds: Rect::default(),
            enabled: true,
            focused: false,
            selected: false,
            pid: 0,
            attributes: HashMap::new(),
            actions: Vec::new(),
            fail_children: false,
            appear_after: None,
            children: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    /// Owning pid; children inherit it unless they set their own.
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Allow `perform_action(action)`; anything else is `NotSupported`.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Make `load_children` on this node fail.
    pub fn fail_children(mut self) -> Self {
        self.fail_children = true;
        self
    }

    /// Hide this node from its parent's children until `delay` after the
    /// adapter was created.
    pub fn appear_after(mut self, delay: Duration) -> Self {
        self.appear_after = Some(delay);
        self
    }

    pub fn child(mut self, child: MockNode) -> Self {
        self.children.push(child);
        self
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

struct MockRef {
    index: usize,
    live: Arc<AtomicUsize>,
}

impl MockRef {
    fn new(index: usize, live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            index,
            live: Arc::clone(live),
        }
    }
}

impl Drop for MockRef {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl NativeRef for MockRef {
    fn address(&self) -> usize {
        BASE_ADDRESS + self.index * 0x10
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

struct Slot {
    node: MockNode,
    children: Vec<usize>,
}

#[derive(Default)]
struct MockState {
    closed: bool,
    close_calls: usize,
    focused_pid: Option<u32>,
    focus_target: Option<usize>,
    actions: Vec<(String, String)>,
    values: HashMap<usize, String>,
    loads: HashMap<usize, usize>,
}

/// In-memory adapter over a [`MockNode`] forest.
///
/// Arena slot 0 is the synthetic root; each top-level node passed to
/// [`MockAdapter::new`] is an application.
pub struct MockAdapter {
    arena: Vec<Slot>,
    live: Arc<AtomicUsize>,
    created: Instant,
    max_children: usize,
    max_applications: usize,
    state: Mutex<MockState>,
}

impl MockAdapter {
    pub fn new(applications: Vec<MockNode>) -> Self {
        let mut arena = Vec::new();
        let mut root = MockNode::new(Role::Unknown).name("(root)");
        root.children = applications;
        flatten(&mut arena, root, 0);

        let config = FinderConfig::default();
        Self {
            arena,
            live: Arc::new(AtomicUsize::new(0)),
            created: Instant::now(),
            max_children: config.max_children,
            max_applications: config.max_applications,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Apply the child and application caps from `config`.
    pub fn with_config(mut self, config: &FinderConfig) -> Self {
        self.max_children = config.max_children;
        self.max_applications = config.max_applications;
        self
    }

    /// Application returned by `focused_application`; none by default.
    pub fn with_focused_pid(self, pid: u32) -> Self {
        self.state.lock().focused_pid = Some(pid);
        self
    }

    pub fn into_adapter(self) -> Arc<dyn Adapter> {
        Arc::new(self)
    }

    /// Shared counter of native handles currently alive.
    pub fn live_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.live)
    }

    pub fn live_refs(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// `(node name, action)` pairs in call order.
    pub fn action_log(&self) -> Vec<(String, String)> {
        self.state.lock().actions.clone()
    }

    /// Last value set on the node named `name`.
    pub fn value_of(&self, name: &str) -> Option<String> {
        let index = self.index_of(name)?;
        self.state.lock().values.get(&index).cloned()
    }

    /// Name of the node that last received `focus`.
    pub fn focus_target(&self) -> Option<String> {
        let index = self.state.lock().focus_target?;
        Some(self.arena[index].node.name.clone())
    }

    /// How many times children of the node named `name` were loaded.
    pub fn load_count(&self, name: &str) -> usize {
        self.index_of(name)
            .and_then(|i| self.state.lock().loads.get(&i).copied())
            .unwrap_or(0)
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.arena.iter().position(|slot| slot.node.name == name)
    }

    fn check_open(&self) -> Result<(), UiaxError> {
        if self.state.lock().closed {
            Err(UiaxError::closed())
        } else {
            Ok(())
        }
    }

    fn visible(&self, index: usize) -> bool {
        match self.arena[index].node.appear_after {
            Some(delay) => self.created.elapsed() >= delay,
            None => true,
        }
    }

    fn record(&self, index: usize) -> NativeElement {
        let node = &self.arena[index].node;
        let mut native = NativeElement::new(NativeHandle::new(MockRef::new(index, &self.live)));
        native.role = node.role;
        native.name = node.name.clone();
        native.title = node.title.clone();
        native.value = node.value.clone();
        native.description = node.description.clone();
        native.bounds = node.bounds;
        native.enabled = node.enabled;
        native.focused = node.focused;
        native.selected = node.selected;
        native.pid = node.pid;
        native.attributes = node.attributes.clone();
        native
    }

    fn index(&self, handle: &NativeHandle) -> Result<usize, UiaxError> {
        let native = expect_native::<MockRef>(handle, self.backend())?;
        Ok(native.index)
    }

    fn applications(&self) -> impl Iterator<Item = usize> + '_ {
        self.arena[0]
            .children
            .iter()
            .copied()
            .filter(|&i| self.visible(i))
    }
}

fn flatten(arena: &mut Vec<Slot>, mut node: MockNode, inherited_pid: u32) -> usize {
    if node.pid == 0 {
        node.pid = inherited_pid;
    }
    let pid = node.pid;
    let children = std::mem::take(&mut node.children);
    let index = arena.len();
    arena.push(Slot {
        node,
        children: Vec::new(),
    });
    let child_indices = children
        .into_iter()
        .map(|child| flatten(arena, child, pid))
        .collect();
    arena[index].children = child_indices;
    index
}

impl Adapter for MockAdapter {
    fn backend(&self) -> &'static str {
        "mock"
    }

    fn root(&self) -> Result<NativeElement, UiaxError> {
        self.check_open()?;
        Ok(self.record(0))
    }

    fn focused_application(&self) -> Result<NativeElement, UiaxError> {
        self.check_open()?;
        let pid = self
            .state
            .lock()
            .focused_pid
            .ok_or_else(|| UiaxError::NotFound("no application is in the foreground".into()))?;
        self.application_by_pid(pid)
    }

    fn focused_element(&self) -> Result<NativeElement, UiaxError> {
        self.check_open()?;
        (1..self.arena.len())
            .find(|&i| self.arena[i].node.focused && self.visible(i))
            .map(|i| self.record(i))
            .ok_or(UiaxError::NoFocus)
    }

    fn application_by_pid(&self, pid: u32) -> Result<NativeElement, UiaxError> {
        self.check_open()?;
        self.applications()
            .find(|&i| self.arena[i].node.pid == pid)
            .map(|i| self.record(i))
            .ok_or_else(|| UiaxError::NotFound(format!("no application window for pid {pid}")))
    }

    fn all_applications(&self) -> Result<Vec<NativeElement>, UiaxError> {
        self.check_open()?;
        Ok(self
            .applications()
            .take(self.max_applications)
            .map(|i| self.record(i))
            .collect())
    }

    fn focus(&self, handle: &NativeHandle) -> Result<(), UiaxError> {
        self.check_open()?;
        let index = self.index(handle)?;
        self.state.lock().focus_target = Some(index);
        Ok(())
    }

    fn perform_action(&self, handle: &NativeHandle, action: &str) -> Result<(), UiaxError> {
        self.check_open()?;
        let index = self.index(handle)?;
        let node = &self.arena[index].node;
        if !node.actions.iter().any(|a| a == action) {
            return Err(UiaxError::NotSupported(format!(
                "action '{action}' on {}",
                node.name
            )));
        }
        self.state
            .lock()
            .actions
            .push((node.name.clone(), action.to_owned()));
        Ok(())
    }

    fn set_value(&self, handle: &NativeHandle, value: &str) -> Result<(), UiaxError> {
        self.check_open()?;
        let index = self.index(handle)?;
        if !self.arena[index].node.enabled {
            return Err(UiaxError::generic(-25200, "element is disabled"));
        }
        self.state.lock().values.insert(index, value.to_owned());
        Ok(())
    }

    fn load_children(&self, handle: &NativeHandle) -> Result<Vec<NativeElement>, UiaxError> {
        self.check_open()?;
        let index = self.index(handle)?;
        *self.state.lock().loads.entry(index).or_default() += 1;

        let slot = &self.arena[index];
        if slot.node.fail_children {
            return Err(UiaxError::generic(-25204, "cannot complete"));
        }
        Ok(slot
            .children
            .iter()
            .copied()
            .filter(|&i| self.visible(i))
            .take(self.max_children)
            .map(|i| self.record(i))
            .collect())
    }

    fn close(&self) -> Result<(), UiaxError> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        state.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    fn fixture() -> MockAdapter {
        MockAdapter::new(vec![
            MockNode::new(Role::Application)
                .name("Editor")
                .pid(7)
                .child(
                    MockNode::new(Role::Window)
                        .title("doc.txt")
                        .child(MockNode::new(Role::Button).name("Save")),
                )
                .child(MockNode::new(Role::Group).name("broken").fail_children()),
            MockNode::new(Role::Application).name("Shell").pid(8),
        ])
    }

    #[test]
    fn test_pids_are_inherited() {
        let mock = fixture();
        let save = mock.index_of("Save").unwrap();
        assert_eq!(mock.arena[save].node.pid, 7);
    }

    #[test]
    fn test_handle_release_on_drop() {
        let mock = fixture();
        let counter = mock.live_counter();
        let adapter = mock.into_adapter();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let root = Element::from_native(adapter.root().unwrap(), None, &adapter, true);
        crate::tree::walk(&root, &Default::default(), |_, _| true).unwrap();
        assert!(counter.load(Ordering::SeqCst) > 0);

        drop(root);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_records_drop_releases() {
        let mock = fixture();
        for _ in 0..10 {
            let apps = mock.all_applications().unwrap();
            assert_eq!(apps.len(), 2);
            assert_eq!(mock.live_refs(), 2);
        }
        assert_eq!(mock.live_refs(), 0);
    }

    #[test]
    fn test_failed_children_are_soft() {
        let mock = fixture();
        let adapter = mock.into_adapter();
        let root = Element::from_native(adapter.root().unwrap(), None, &adapter, true);
        let editor = Arc::clone(&root.children()[0]);
        let broken = Arc::clone(&editor.children()[1]);
        assert!(broken.children().is_empty());
        assert!(broken.children_loaded());
    }

    #[test]
    fn test_children_loaded_once() {
        let mock = Arc::new(fixture());
        let adapter: Arc<dyn Adapter> = mock.clone();
        let root = Element::from_native(adapter.root().unwrap(), None, &adapter, true);
        let editor = Arc::clone(&root.children()[0]);
        editor.load_children();
        editor.load_children();
        let _ = editor.children();
        assert_eq!(mock.load_count("Editor"), 1);
    }

    #[test]
    fn test_max_children_cap() {
        let cfg = FinderConfig {
            max_children: 1,
            ..FinderConfig::default()
        };
        let mock = fixture().with_config(&cfg);
        let editor = mock.application_by_pid(7).unwrap();
        assert_eq!(mock.load_children(&editor.handle).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_action_not_supported() {
        let mock = fixture();
        let app = mock.application_by_pid(8).unwrap();
        assert!(matches!(
            mock.perform_action(&app.handle, "AXPress"),
            Err(UiaxError::NotSupported(_))
        ));
    }

    #[test]
    fn test_closed_adapter_rejects_calls() {
        let mock = fixture();
        mock.close().unwrap();
        mock.close().unwrap();
        assert_eq!(mock.close_calls(), 2);
        assert!(matches!(mock.root(), Err(UiaxError::InvalidElement(_))));
        assert!(matches!(mock.all_applications(), Err(UiaxError::InvalidElement(_))));
    }
}
