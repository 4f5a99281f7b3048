//! macOS Accessibility (AX) backend.
//!
//! All unsafe CoreFoundation / ApplicationServices code for macOS lives in
//! this module; the rest of the crate only sees [`NativeElement`] records.
//!
//! Every `AXUIElement` is held as a `CFRetained`, so wrapping takes exactly
//! one retain and dropping the handle releases it.  The adapter itself owns
//! one retain on the system-wide element until [`Adapter::close`].
//!
//! The system-wide element has no `AXChildren`; its children are served as
//! the running regular applications, so a walk from `Finder::root` reaches
//! every application.

use std::ffi::c_void;
use std::ptr::NonNull;

use objc2_app_kit::{NSApplicationActivationPolicy, NSRunningApplication, NSWorkspace};
use objc2_application_services::{
    AXError, AXIsProcessTrusted, AXIsProcessTrustedWithOptions, AXUIElement, AXValue as AXValueRef,
    AXValueType,
};
use objc2_core_foundation::{
    CFArray, CFBoolean, CFDictionary, CFNumber, CFRetained, CFString, CFType, CGPoint, CGSize,
};
use parking_lot::Mutex;

use super::{expect_native, Adapter, NativeElement, NativeHandle, NativeRef};
use crate::config::FinderConfig;
use crate::errors::UiaxError;
use crate::geometry::Rect;
use crate::role::role_from_ax;

// ---------------------------------------------------------------------------
// Native handle
// ---------------------------------------------------------------------------

/// One retained `AXUIElement`.
struct AxRef(CFRetained<AXUIElement>);

// AXUIElement is an immutable CF object; the AX API may be called from any
// thread.
unsafe impl Send for AxRef {}
unsafe impl Sync for AxRef {}

impl NativeRef for AxRef {
    fn address(&self) -> usize {
        address_of(&self.0)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn address_of(element: &CFRetained<AXUIElement>) -> usize {
    CFRetained::as_ptr(element).as_ptr() as usize
}

// ---------------------------------------------------------------------------
// Trust
// ---------------------------------------------------------------------------

/// Whether this process may read other applications' accessibility trees.
pub fn is_trusted() -> bool {
    unsafe { AXIsProcessTrusted() }
}

/// Ask the OS to show its accessibility-permission prompt.  Returns at
/// once; the user answers asynchronously.
fn request_trust_prompt() -> bool {
    let key = CFString::from_static_str("AXTrustedCheckOptionPrompt");
    let options =
        CFDictionary::<CFString, CFBoolean>::from_slices(&[&*key], &[CFBoolean::new(true)]);
    unsafe { AXIsProcessTrustedWithOptions(Some(options.as_opaque())) }
}

// ---------------------------------------------------------------------------
// Attribute access
// ---------------------------------------------------------------------------

fn check(result: AXError) -> Result<(), AXError> {
    if result == AXError::Success {
        Ok(())
    } else {
        Err(result)
    }
}

fn copy_attr(element: &AXUIElement, name: &str) -> Result<CFRetained<CFType>, AXError> {
    let attr = CFString::from_str(name);
    unsafe {
        let mut value: *const CFType = std::ptr::null();
        let ptr = NonNull::new(std::ptr::addr_of_mut!(value)).ok_or(AXError::Failure)?;
        check(element.copy_attribute_value(&attr, ptr))?;
        let value = NonNull::new(value.cast_mut()).ok_or(AXError::NoValue)?;
        Ok(CFRetained::from_raw(value))
    }
}

fn string_attr(element: &AXUIElement, name: &str) -> String {
    copy_attr(element, name)
        .ok()
        .and_then(|v| v.downcast_ref::<CFString>().map(|s| s.to_string()))
        .unwrap_or_default()
}

fn bool_attr(element: &AXUIElement, name: &str) -> Option<bool> {
    let value = copy_attr(element, name).ok()?;
    if let Some(b) = value.downcast_ref::<CFBoolean>() {
        return Some(b.as_bool());
    }
    value.downcast_ref::<CFNumber>()?.as_i64().map(|n| n != 0)
}

fn element_attr(element: &AXUIElement, name: &str) -> Result<CFRetained<AXUIElement>, AXError> {
    copy_attr(element, name)?
        .downcast::<AXUIElement>()
        .map_err(|_| AXError::IllegalArgument)
}

/// `AXValue` as display text: strings verbatim, numbers and booleans
/// formatted.
fn value_text(element: &AXUIElement) -> String {
    let Ok(value) = copy_attr(element, "AXValue") else {
        return String::new();
    };
    if let Some(s) = value.downcast_ref::<CFString>() {
        return s.to_string();
    }
    if let Some(n) = value.downcast_ref::<CFNumber>() {
        if let Some(i) = n.as_i64() {
            return i.to_string();
        }
        if let Some(f) = n.as_f64() {
            return f.to_string();
        }
    }
    if let Some(b) = value.downcast_ref::<CFBoolean>() {
        return b.as_bool().to_string();
    }
    String::new()
}

/// Screen rect from `AXPosition` + `AXSize`; empty when either is missing.
fn bounds(element: &AXUIElement) -> Rect {
    let (Ok(pos), Ok(size)) = (copy_attr(element, "AXPosition"), copy_attr(element, "AXSize"))
    else {
        return Rect::default();
    };
    let (Some(pos), Some(size)) = (
        pos.downcast_ref::<AXValueRef>(),
        size.downcast_ref::<AXValueRef>(),
    ) else {
        return Rect::default();
    };

    let mut point = CGPoint { x: 0.0, y: 0.0 };
    let mut extent = CGSize {
        width: 0.0,
        height: 0.0,
    };
    let ok = unsafe {
        pos.r#type() == AXValueType::CGPoint
            && size.r#type() == AXValueType::CGSize
            && NonNull::new((std::ptr::addr_of_mut!(point)).cast::<c_void>())
                .is_some_and(|p| pos.value(AXValueType::CGPoint, p))
            && NonNull::new((std::ptr::addr_of_mut!(extent)).cast::<c_void>())
                .is_some_and(|p| size.value(AXValueType::CGSize, p))
    };
    if !ok {
        return Rect::default();
    }
    Rect::new(
        point.x as i32,
        point.y as i32,
        extent.width as i32,
        extent.height as i32,
    )
}

fn pid_of(element: &AXUIElement) -> u32 {
    let mut pid: i32 = 0;
    let result = unsafe { element.pid(NonNull::new_unchecked(std::ptr::addr_of_mut!(pid))) };
    if result == AXError::Success {
        pid as u32
    } else {
        0
    }
}

/// Read the standard attribute set and take ownership of `element`.
fn read_element(element: CFRetained<AXUIElement>) -> NativeElement {
    let raw_role = string_attr(&element, "AXRole");
    let title = string_attr(&element, "AXTitle");
    let description = string_attr(&element, "AXDescription");
    let value = value_text(&element);
    let enabled = bool_attr(&element, "AXEnabled").unwrap_or(true);
    let focused = bool_attr(&element, "AXFocused").unwrap_or(false);
    let selected = bool_attr(&element, "AXSelected").unwrap_or(false);
    let rect = bounds(&element);
    let pid = pid_of(&element);
    let subrole = string_attr(&element, "AXSubrole");

    let mut native = NativeElement::new(NativeHandle::new(AxRef(element)));
    native.role = role_from_ax(&raw_role);
    native.name = if title.is_empty() {
        description.clone()
    } else {
        title.clone()
    };
    native.title = title;
    native.description = description;
    native.value = value;
    native.enabled = enabled;
    native.focused = focused;
    native.selected = selected;
    native.bounds = rect;
    native.pid = pid;
    if !raw_role.is_empty() {
        native.attributes.insert("ax_role".into(), raw_role.into());
    }
    if !subrole.is_empty() {
        native.attributes.insert("ax_subrole".into(), subrole.into());
    }
    native
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// macOS accessibility adapter.
///
/// Entry points are serialized on one mutex, which also holds the
/// system-wide element (`None` once closed).
pub struct AxAdapter {
    system_wide: Mutex<Option<AxRef>>,
    max_applications: usize,
    max_children: usize,
}

impl AxAdapter {
    /// Fails `PermissionDenied` when the process is not trusted, after
    /// (optionally) asking the OS to prompt the user.
    pub fn connect(config: &FinderConfig) -> Result<Self, UiaxError> {
        if !is_trusted() {
            if config.prompt_for_trust {
                request_trust_prompt();
            }
            log::warn!("accessibility access not granted; grant it and retry");
            return Err(UiaxError::PermissionDenied);
        }

        let system_wide = unsafe { AXUIElement::new_system_wide() };
        log::debug!("ax adapter connected");
        Ok(Self {
            system_wide: Mutex::new(Some(AxRef(system_wide))),
            max_applications: config.max_applications,
            max_children: config.max_children,
        })
    }

    /// Run `f` with the system-wide element while holding the adapter lock.
    fn with_system<T>(
        &self,
        f: impl FnOnce(&CFRetained<AXUIElement>) -> Result<T, UiaxError>,
    ) -> Result<T, UiaxError> {
        let guard = self.system_wide.lock();
        let system = guard.as_ref().ok_or_else(UiaxError::closed)?;
        f(&system.0)
    }

    fn element<'a>(&self, handle: &'a NativeHandle) -> Result<&'a AXUIElement, UiaxError> {
        Ok(&expect_native::<AxRef>(handle, self.backend())?.0)
    }

    /// Regular (Dock-visible) applications, capped at `max_applications`.
    fn regular_applications(&self) -> Vec<NativeElement> {
        objc2::rc::autoreleasepool(|_| {
            let workspace = unsafe { NSWorkspace::sharedWorkspace() };
            let running = unsafe { workspace.runningApplications() };
            let regular: Vec<_> = running
                .iter()
                .filter(|app| unsafe { app.activationPolicy() } == NSApplicationActivationPolicy::Regular)
                .collect();
            if regular.len() > self.max_applications {
                log::warn!(
                    "{} regular applications running; returning the first {}",
                    regular.len(),
                    self.max_applications
                );
            }
            regular
                .iter()
                .take(self.max_applications)
                .map(|app| application_record(app))
                .collect()
        })
    }
}

fn application_record(app: &NSRunningApplication) -> NativeElement {
    let pid = unsafe { app.processIdentifier() };
    let element = unsafe { AXUIElement::new_application(pid) };
    let mut native = read_element(element);
    if native.name.is_empty() {
        if let Some(name) = unsafe { app.localizedName() } {
            native.name = name.to_string();
        }
    }
    if native.pid == 0 {
        native.pid = pid as u32;
    }
    native
}

impl Adapter for AxAdapter {
    fn backend(&self) -> &'static str {
        "ax"
    }

    fn root(&self) -> Result<NativeElement, UiaxError> {
        self.with_system(|system| Ok(read_element(system.clone())))
    }

    fn focused_application(&self) -> Result<NativeElement, UiaxError> {
        self.with_system(|system| {
            let app = element_attr(system, "AXFocusedApplication").map_err(|e| {
                log::debug!("AXFocusedApplication: {e:?}");
                UiaxError::NotFound("no application is in the foreground".into())
            })?;
            Ok(read_element(app))
        })
    }

    fn focused_element(&self) -> Result<NativeElement, UiaxError> {
        self.with_system(|system| {
            let focused = element_attr(system, "AXFocusedUIElement").map_err(|e| match e {
                AXError::APIDisabled => UiaxError::PermissionDenied,
                _ => UiaxError::NoFocus,
            })?;
            Ok(read_element(focused))
        })
    }

    fn application_by_pid(&self, pid: u32) -> Result<NativeElement, UiaxError> {
        self.with_system(|_| {
            let not_found = || UiaxError::NotFound(format!("no application window for pid {pid}"));
            let pid = i32::try_from(pid).map_err(|_| not_found())?;
            let app = unsafe { AXUIElement::new_application(pid) };
            let windows = copy_attr(&app, "AXWindows").map_err(|_| not_found())?;
            let has_window = windows
                .downcast_ref::<CFArray>()
                .is_some_and(|w| w.len() > 0);
            if !has_window {
                return Err(not_found());
            }
            Ok(read_element(app))
        })
    }

    fn all_applications(&self) -> Result<Vec<NativeElement>, UiaxError> {
        self.with_system(|_| Ok(self.regular_applications()))
    }

    fn focus(&self, handle: &NativeHandle) -> Result<(), UiaxError> {
        self.with_system(|_| {
            let element = self.element(handle)?;
            unsafe {
                let raise = element.perform_action(&CFString::from_static_str("AXRaise"));
                if raise != AXError::Success {
                    log::debug!("AXRaise ignored: {raise:?}");
                }
                check(element.set_attribute_value(
                    &CFString::from_static_str("AXFocused"),
                    CFBoolean::new(true),
                ))?;
            }
            Ok(())
        })
    }

    fn perform_action(&self, handle: &NativeHandle, action: &str) -> Result<(), UiaxError> {
        self.with_system(|_| {
            let element = self.element(handle)?;
            unsafe { check(element.perform_action(&CFString::from_str(action)))? };
            Ok(())
        })
    }

    fn set_value(&self, handle: &NativeHandle, value: &str) -> Result<(), UiaxError> {
        self.with_system(|_| {
            let element = self.element(handle)?;
            let text = CFString::from_str(value);
            unsafe {
                check(element.set_attribute_value(&CFString::from_static_str("AXValue"), &text))?
            };
            Ok(())
        })
    }

    fn load_children(&self, handle: &NativeHandle) -> Result<Vec<NativeElement>, UiaxError> {
        self.with_system(|system| {
            if handle.address() == address_of(system) {
                return Ok(self.regular_applications());
            }
            let element = self.element(handle)?;
            let children = match copy_attr(element, "AXChildren") {
                Ok(value) => value,
                Err(AXError::NoValue) => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };
            let Ok(array) = children.downcast::<CFArray>() else {
                return Ok(Vec::new());
            };
            // SAFETY: AXChildren is always an array of AXUIElements.
            let array: CFRetained<CFArray<AXUIElement>> = unsafe { CFRetained::cast_unchecked(array) };

            let len = array.len();
            if len > self.max_children {
                log::debug!("load_children: capped {len} children at {}", self.max_children);
            }
            // `get` retains each child, so it outlives the array.
            Ok((0..len.min(self.max_children))
                .filter_map(|i| array.get(i))
                .map(read_element)
                .collect())
        })
    }

    fn close(&self) -> Result<(), UiaxError> {
        if self.system_wide.lock().take().is_some() {
            log::debug!("ax adapter released system-wide element");
        }
        Ok(())
    }
}
