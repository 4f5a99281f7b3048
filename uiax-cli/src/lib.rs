//! Shared plumbing for the `uiax-*` command-line tools.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use uiax_core::{CancelToken, Element, Finder, Role, Selector, UiaxError};

/// Install `env_logger`, writing to stderr.  `RUST_LOG` wins over the
/// `--verbose` default.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .try_init();
}

/// Which application a command operates on.
#[derive(Args, Debug, Default)]
pub struct ScopeArgs {
    /// Process id of the target application
    #[arg(long, conflicts_with = "app")]
    pub pid: Option<u32>,

    /// Application name (case-insensitive). Defaults to the focused one.
    #[arg(long)]
    pub app: Option<String>,
}

impl ScopeArgs {
    pub fn is_focused(&self) -> bool {
        self.pid.is_none() && self.app.is_none()
    }

    pub fn resolve(&self, finder: &Finder) -> Result<Arc<Element>, UiaxError> {
        match (self.pid, self.app.as_deref()) {
            (Some(pid), _) => finder.application_by_pid(pid),
            (None, Some(name)) => finder.application_by_name(name),
            (None, None) => finder.focused_application(),
        }
    }

    /// Poll for `selector` under this scope, re-resolving the application on
    /// every attempt.
    pub fn wait_for(
        &self,
        finder: &Finder,
        selector: &Selector,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Arc<Element>, UiaxError> {
        if self.is_focused() {
            return finder.wait_for(selector, timeout, cancel);
        }
        finder.wait_for_with(|| self.resolve(finder), selector, timeout, cancel)
    }
}

/// Predicate flags for `uiax-find`.
#[derive(Args, Debug, Default)]
pub struct SelectorArgs {
    /// Normalized role, e.g. Button or TextField
    #[arg(long)]
    pub role: Option<String>,

    /// Exact name
    #[arg(long)]
    pub name: Option<String>,

    /// Case-insensitive name fragment
    #[arg(long)]
    pub name_contains: Option<String>,

    /// Case-insensitive title fragment
    #[arg(long)]
    pub title_contains: Option<String>,

    /// Exact value
    #[arg(long)]
    pub value: Option<String>,

    /// Only enabled elements
    #[arg(long)]
    pub enabled: bool,

    /// Only the focused element
    #[arg(long)]
    pub focused: bool,
}

impl SelectorArgs {
    /// AND of every given flag.  No flags matches everything.
    pub fn to_selector(&self) -> Result<Selector, UiaxError> {
        let mut parts = Vec::new();
        if let Some(role) = &self.role {
            parts.push(Selector::by_role(role.parse::<Role>()?));
        }
        if let Some(name) = &self.name {
            parts.push(Selector::by_name(name.as_str()));
        }
        if let Some(fragment) = &self.name_contains {
            parts.push(Selector::by_name_contains(fragment.as_str()));
        }
        if let Some(fragment) = &self.title_contains {
            parts.push(Selector::by_title_contains(fragment.as_str()));
        }
        if let Some(value) = &self.value {
            parts.push(Selector::by_value(value.as_str()));
        }
        if self.enabled {
            parts.push(Selector::by_enabled());
        }
        if self.focused {
            parts.push(Selector::by_focused());
        }
        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => Selector::and(parts),
        })
    }
}

/// Report `err` on stderr and map it to the process exit status.
pub fn report(tool: &str, err: &UiaxError) -> ExitCode {
    eprintln!("{tool}: {err}");
    ExitCode::from(exit_code(err))
}

/// `2` for a miss or timeout, `3` for permissions, `1` otherwise.
pub fn exit_code(err: &UiaxError) -> u8 {
    use uiax_core::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::Timeout => 2,
        ErrorKind::PermissionDenied => 3,
        _ => 1,
    }
}

/// Close `finder` explicitly so a failing close is logged, not lost in drop.
pub fn shutdown(finder: Finder) {
    if let Err(e) = finder.close() {
        log::warn!("close failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uiax_core::platform::Adapter;
    use uiax_core::testing::{MockAdapter, MockNode};
    use uiax_core::FinderConfig;

    fn finder() -> Finder {
        let app = MockNode::new(Role::Application)
            .name("Notes")
            .pid(11)
            .child(MockNode::new(Role::Button).name("New Note"))
            .child(MockNode::new(Role::Button).name("Delete").enabled(false));
        let adapter = MockAdapter::new(vec![app]).with_focused_pid(11).into_adapter();
        Finder::with_adapter(adapter, FinderConfig::default())
    }

    #[test]
    fn test_no_flags_matches_everything() {
        let sel = SelectorArgs::default().to_selector().unwrap();
        let f = finder();
        let all = f.find_all(&sel, &CancelToken::new()).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_flags_are_anded() {
        let args = SelectorArgs {
            role: Some("Button".into()),
            enabled: true,
            ..SelectorArgs::default()
        };
        let f = finder();
        let all = f.find_all(&args.to_selector().unwrap(), &CancelToken::new()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name(), "New Note");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let args = SelectorArgs {
            role: Some("Spaceship".into()),
            ..SelectorArgs::default()
        };
        assert!(args.to_selector().is_err());
    }

    #[test]
    fn test_named_scope_wait_sees_late_element() {
        let app = MockNode::new(Role::Application)
            .name("Notes")
            .pid(11)
            .child(
                MockNode::new(Role::Sheet)
                    .name("Saved")
                    .appear_after(Duration::from_millis(150)),
            );
        let adapter = MockAdapter::new(vec![app]).into_adapter();
        let f = Finder::with_adapter(adapter, FinderConfig::default());
        let scope = ScopeArgs {
            app: Some("notes".into()),
            ..ScopeArgs::default()
        };
        let found = scope
            .wait_for(&f, &Selector::by_name("Saved"), Duration::from_secs(2), &CancelToken::new())
            .unwrap();
        assert_eq!(found.pid(), 11);
    }

    #[test]
    fn test_shutdown_closes_adapter() {
        let mock = Arc::new(MockAdapter::new(Vec::new()));
        let adapter: Arc<dyn Adapter> = mock.clone();
        shutdown(Finder::with_adapter(adapter, FinderConfig::default()));
        assert_eq!(mock.close_calls(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&UiaxError::NotFound("x".into())), 2);
        assert_eq!(exit_code(&UiaxError::Timeout(Duration::from_secs(1))), 2);
        assert_eq!(exit_code(&UiaxError::PermissionDenied), 3);
        assert_eq!(exit_code(&UiaxError::Cancelled), 1);
    }

    #[test]
    fn test_scope_resolution() {
        let f = finder();
        assert!(ScopeArgs::default().is_focused());
        assert_eq!(ScopeArgs::default().resolve(&f).unwrap().name(), "Notes");
        let by_name = ScopeArgs {
            app: Some("notes".into()),
            ..ScopeArgs::default()
        };
        assert_eq!(by_name.resolve(&f).unwrap().pid(), 11);
        let missing = ScopeArgs {
            pid: Some(99),
            ..ScopeArgs::default()
        };
        assert_eq!(exit_code(&missing.resolve(&f).unwrap_err()), 2);
    }
}
