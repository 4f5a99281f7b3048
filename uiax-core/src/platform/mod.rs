//! Platform adapter contract and runtime adapter registry.
//!
//! Each OS backend implements [`Adapter`]: a narrow interface that hands out
//! [`NativeElement`] records (attributes read eagerly, plus one owned
//! [`NativeHandle`]) and performs actions keyed on those handles.  The rest
//! of the crate never touches native types.
//!
//! # Handle ownership
//!
//! A [`NativeHandle`] owns exactly one native reference (`CFRetain`'d
//! `AXUIElement`, `AddRef`'d `IUIAutomationElement`, ...).  Dropping it
//! releases that reference, so every early return during element
//! construction releases correctly without extra bookkeeping.
//!
//! # Backend selection
//!
//! [`connect`] calls the constructor installed with [`register_adapter`], or
//! the backend compiled in for the target OS when none is registered.

#[cfg(target_os = "macos")]
pub mod ax;
#[cfg(windows)]
pub mod com;
#[cfg(windows)]
pub mod uia;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{const_rwlock, RwLock};

use crate::config::FinderConfig;
use crate::errors::UiaxError;
use crate::geometry::Rect;
use crate::role::Role;

// ---------------------------------------------------------------------------
// Native handles
// ---------------------------------------------------------------------------

/// A backend's owned reference to one native UI element.
///
/// Implementors release their reference in `Drop`.
pub trait NativeRef: Any + Send + Sync {
    /// Address of the native object, used to build element ids.
    fn address(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

/// Type-erased, owning wrapper around a backend's [`NativeRef`].
pub struct NativeHandle(Box<dyn NativeRef>);

impl NativeHandle {
    pub fn new<R: NativeRef>(native: R) -> Self {
        Self(Box::new(native))
    }

    pub fn address(&self) -> usize {
        self.0.address()
    }

    /// Recover the backend's concrete reference type.
    pub fn downcast_ref<R: NativeRef>(&self) -> Option<&R> {
        self.0.as_any().downcast_ref::<R>()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:#x})", self.address())
    }
}

/// Downcast a handle or fail with `InvalidElement`.
pub(crate) fn expect_native<'a, R: NativeRef>(
    handle: &'a NativeHandle,
    backend: &str,
) -> Result<&'a R, UiaxError> {
    handle.downcast_ref::<R>().ok_or_else(|| {
        UiaxError::InvalidElement(format!("handle was not created by the {backend} backend"))
    })
}

// ---------------------------------------------------------------------------
// Element records
// ---------------------------------------------------------------------------

/// Attributes read from one native element, plus its owned handle.
///
/// Produced by an [`Adapter`]; the finder wraps it into an
/// [`Element`](crate::element::Element).
#[derive(Debug)]
pub struct NativeElement {
    pub role: Role,
    pub name: String,
    pub title: String,
    pub value: String,
    pub description: String,
    pub bounds: Rect,
    pub enabled: bool,
    pub focused: bool,
    pub selected: bool,
    pub pid: u32,
    pub attributes: HashMap<String, serde_json::Value>,
    pub handle: NativeHandle,
}

impl NativeElement {
    /// A record with empty labels, `enabled = true`, and everything else
    /// zeroed.
    pub fn new(handle: NativeHandle) -> Self {
        Self {
            role: Role::Unknown,
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
            handle,
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter contract
// ---------------------------------------------------------------------------

/// Back-end interface every OS implementation satisfies.
///
/// All methods fail with [`UiaxError::InvalidElement`] once [`Adapter::close`]
/// has run.  Backends with thread affinity also fail that way when called
/// from a thread other than the one that constructed them.
pub trait Adapter: Send + Sync {
    /// Short backend identifier for logs (`"ax"`, `"uia"`, `"mock"`).
    fn backend(&self) -> &'static str;

    /// The synthetic cross-application top element.
    fn root(&self) -> Result<NativeElement, UiaxError>;

    /// The foreground application or window. `NotFound` when none.
    fn focused_application(&self) -> Result<NativeElement, UiaxError>;

    /// The element holding keyboard focus. `NoFocus` when none.
    fn focused_element(&self) -> Result<NativeElement, UiaxError>;

    /// The application element for `pid`. `NotFound` when it has no window.
    fn application_by_pid(&self, pid: u32) -> Result<NativeElement, UiaxError>;

    /// ASCII-case-insensitive match on name or title among
    /// [`Adapter::all_applications`].
    fn application_by_name(&self, name: &str) -> Result<NativeElement, UiaxError> {
        self.all_applications()?
            .into_iter()
            .find(|app| {
                app.name.eq_ignore_ascii_case(name) || app.title.eq_ignore_ascii_case(name)
            })
            .ok_or_else(|| UiaxError::NotFound(format!("no application named '{name}'")))
    }

    /// Currently running graphical applications.
    fn all_applications(&self) -> Result<Vec<NativeElement>, UiaxError>;

    fn focus(&self, handle: &NativeHandle) -> Result<(), UiaxError>;

    fn perform_action(&self, handle: &NativeHandle, action: &str) -> Result<(), UiaxError>;

    fn set_value(&self, handle: &NativeHandle, value: &str) -> Result<(), UiaxError>;

    /// Direct children of `handle`, in native order.
    fn load_children(&self, handle: &NativeHandle) -> Result<Vec<NativeElement>, UiaxError>;

    /// Release every native resource the adapter holds. Idempotent.
    fn close(&self) -> Result<(), UiaxError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Constructor installed with [`register_adapter`].
pub type AdapterConstructor = fn(&FinderConfig) -> Result<Arc<dyn Adapter>, UiaxError>;

static CONSTRUCTOR: RwLock<Option<AdapterConstructor>> = const_rwlock(None);

/// Install the adapter constructor used by [`connect`], replacing any
/// previous one.
pub fn register_adapter(constructor: AdapterConstructor) {
    *CONSTRUCTOR.write() = Some(constructor);
}

/// Remove a registered constructor, restoring the native default.
pub fn unregister_adapter() {
    *CONSTRUCTOR.write() = None;
}

/// Construct the active adapter.
pub fn connect(config: &FinderConfig) -> Result<Arc<dyn Adapter>, UiaxError> {
    let registered = *CONSTRUCTOR.read();
    match registered {
        Some(constructor) => constructor(config),
        None => native_adapter(config),
    }
}

#[cfg(target_os = "macos")]
fn native_adapter(config: &FinderConfig) -> Result<Arc<dyn Adapter>, UiaxError> {
    let adapter = ax::AxAdapter::connect(config)?;
    Ok(Arc::new(adapter))
}

#[cfg(windows)]
fn native_adapter(config: &FinderConfig) -> Result<Arc<dyn Adapter>, UiaxError> {
    let adapter = uia::UiaAdapter::connect(config)?;
    Ok(Arc::new(adapter))
}

#[cfg(not(any(target_os = "macos", windows)))]
fn native_adapter(_config: &FinderConfig) -> Result<Arc<dyn Adapter>, UiaxError> {
    Err(UiaxError::NotSupported(format!(
        "no accessibility backend for {}",
        std::env::consts::OS
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe(usize);

    impl NativeRef for Probe {
        fn address(&self) -> usize {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Other;

    impl NativeRef for Other {
        fn address(&self) -> usize {
            0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_handle_downcast() {
        let handle = NativeHandle::new(Probe(0xbeef));
        assert_eq!(handle.address(), 0xbeef);
        assert!(handle.downcast_ref::<Probe>().is_some());
        assert!(handle.downcast_ref::<Other>().is_none());
        assert!(expect_native::<Other>(&handle, "test").is_err());
    }

    #[test]
    fn test_native_element_defaults() {
        let native = NativeElement::new(NativeHandle::new(Probe(1)));
        assert!(native.enabled);
        assert!(!native.focused);
        assert_eq!(native.role, Role::Unknown);
        assert!(native.attributes.is_empty());
    }
}
