//! Windows UI Automation backend.
//!
//! # Thread model
//!
//! UIA objects live in the COM apartment of the thread that created them.
//! [`UiaAdapter::connect`] initializes COM on the calling thread, creates one
//! `IUIAutomation` instance and one raw-view tree walker, and records that
//! thread as the owner.  Every adapter entry point checks the caller's
//! thread and fails with `InvalidElement` elsewhere.  The automation
//! instance and walker are released in [`Adapter::close`] on the owner
//! thread.  Element handles count themselves; while any is still alive at
//! close, the apartment is left initialized so their final `Release` still
//! has COM underneath.
//!
//! # Element reads
//!
//! Properties are read with the `Current*` getters (live, no cache
//! request), and pattern-backed values (value, selection) are read best
//! effort: an element lacking the pattern simply reports an empty value.

use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use windows::core::{Interface, BSTR};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, TRUE};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_INPROC_SERVER};
use windows::Win32::UI::Accessibility::*;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetForegroundWindow, GetWindowTextLengthW, GetWindowTextW,
    GetWindowThreadProcessId, IsWindowVisible,
};

use super::com::ComGuard;
use super::{expect_native, Adapter, NativeElement, NativeHandle, NativeRef};
use crate::config::FinderConfig;
use crate::errors::UiaxError;
use crate::geometry::Rect;
use crate::role::{role_from_uia, Role};

// ---------------------------------------------------------------------------
// Native handle
// ---------------------------------------------------------------------------

/// One `AddRef`'d automation element; `Release`d on drop.
struct UiaRef {
    element: IUIAutomationElement,
    live: Arc<AtomicUsize>,
}

impl UiaRef {
    fn new(element: IUIAutomationElement, live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self {
            element,
            live: Arc::clone(live),
        }
    }
}

impl Drop for UiaRef {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

// SAFETY: elements come from an MTA automation instance; their proxies are
// free-threaded, so moving or releasing them off the owner thread is sound.
// Method calls still only happen on the owner thread (see `UiaAdapter`), and
// the apartment is not torn down while any `UiaRef` is alive (see
// `release_state`).
unsafe impl Send for UiaRef {}
unsafe impl Sync for UiaRef {}

impl NativeRef for UiaRef {
    fn address(&self) -> usize {
        self.element.as_raw() as usize
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

struct UiaState {
    automation: IUIAutomation,
    walker: IUIAutomationTreeWalker,
    live: Arc<AtomicUsize>,
    // Dropped last: COM must outlive the interfaces above.
    _com: ComGuard,
}

/// Release the automation instance and walker; uninitialize COM only when
/// no element handle is left to `Release` afterwards.
fn release_state(state: UiaState) {
    let UiaState {
        automation,
        walker,
        live,
        _com: com,
    } = state;
    drop(walker);
    drop(automation);
    let outstanding = live.load(Ordering::Acquire);
    if outstanding > 0 {
        log::warn!("uia adapter closed with {outstanding} live element(s); keeping COM initialized");
        std::mem::forget(com);
    } else {
        drop(com);
    }
}

/// UI Automation adapter bound to its constructing thread.
pub struct UiaAdapter {
    owner: ThreadId,
    max_children: usize,
    state: Mutex<Option<UiaState>>,
}

// SAFETY: all COM access goes through `with_state`, which rejects every
// thread but `owner`.
unsafe impl Send for UiaAdapter {}
unsafe impl Sync for UiaAdapter {}

impl UiaAdapter {
    /// Initialize COM on this thread and create the automation instance.
    pub fn connect(config: &FinderConfig) -> Result<Self, UiaxError> {
        let com = ComGuard::init()?;
        let automation: IUIAutomation =
            unsafe { CoCreateInstance(&CUIAutomation, None, CLSCTX_INPROC_SERVER)? };
        let walker = unsafe { automation.RawViewWalker()? };

        let owner = thread::current().id();
        log::debug!("uia adapter bound to thread {owner:?}");
        Ok(Self {
            owner,
            max_children: config.max_children,
            state: Mutex::new(Some(UiaState {
                automation,
                walker,
                live: Arc::new(AtomicUsize::new(0)),
                _com: com,
            })),
        })
    }

    fn check_thread(&self) -> Result<(), UiaxError> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(UiaxError::InvalidElement(format!(
                "UI Automation adapter owned by thread {:?} used from {:?}",
                self.owner,
                thread::current().id()
            )))
        }
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&UiaState) -> Result<T, UiaxError>,
    ) -> Result<T, UiaxError> {
        self.check_thread()?;
        let guard = self.state.lock();
        let state = guard.as_ref().ok_or_else(UiaxError::closed)?;
        f(state)
    }

    fn element<'a>(&self, handle: &'a NativeHandle) -> Result<&'a IUIAutomationElement, UiaxError> {
        Ok(&expect_native::<UiaRef>(handle, self.backend())?.element)
    }

    fn from_window(state: &UiaState, hwnd: HWND) -> Result<NativeElement, UiaxError> {
        let element = unsafe { state.automation.ElementFromHandle(hwnd)? };
        Ok(read_element(element, &state.live))
    }
}

impl Drop for UiaAdapter {
    fn drop(&mut self) {
        if thread::current().id() != self.owner {
            if let Some(state) = self.state.get_mut().take() {
                log::warn!("uia adapter dropped off its owner thread; leaking COM state");
                std::mem::forget(state);
            }
        } else if let Some(state) = self.state.get_mut().take() {
            release_state(state);
        }
    }
}

impl Adapter for UiaAdapter {
    fn backend(&self) -> &'static str {
        "uia"
    }

    fn root(&self) -> Result<NativeElement, UiaxError> {
        self.with_state(|s| {
            let root = unsafe { s.automation.GetRootElement()? };
            Ok(read_element(root, &s.live))
        })
    }

    fn focused_application(&self) -> Result<NativeElement, UiaxError> {
        self.with_state(|s| {
            let hwnd = unsafe { GetForegroundWindow() };
            if hwnd.0.is_null() {
                return Err(UiaxError::NotFound("no foreground window".into()));
            }
            Self::from_window(s, hwnd)
        })
    }

    fn focused_element(&self) -> Result<NativeElement, UiaxError> {
        self.with_state(|s| {
            let element = unsafe { s.automation.GetFocusedElement() }.map_err(|e| {
                log::debug!("GetFocusedElement: {e}");
                UiaxError::NoFocus
            })?;
            Ok(read_element(element, &s.live))
        })
    }

    fn application_by_pid(&self, pid: u32) -> Result<NativeElement, UiaxError> {
        self.with_state(|s| {
            let hwnd = titled_windows()?
                .into_iter()
                .find(|&hwnd| window_pid(hwnd) == pid)
                .ok_or_else(|| UiaxError::NotFound(format!("no visible window for pid {pid}")))?;
            Self::from_window(s, hwnd)
        })
    }

    fn all_applications(&self) -> Result<Vec<NativeElement>, UiaxError> {
        self.with_state(|s| {
            let mut apps = Vec::new();
            for hwnd in titled_windows()? {
                match Self::from_window(s, hwnd) {
                    Ok(app) => apps.push(app),
                    Err(e) => log::debug!("ElementFromHandle({:?}) skipped: {e}", hwnd.0),
                }
            }
            Ok(apps)
        })
    }

    fn focus(&self, handle: &NativeHandle) -> Result<(), UiaxError> {
        self.with_state(|_| {
            let element = self.element(handle)?;
            unsafe { element.SetFocus()? };
            Ok(())
        })
    }

    fn perform_action(&self, handle: &NativeHandle, action: &str) -> Result<(), UiaxError> {
        self.with_state(|_| {
            let element = self.element(handle)?;
            unsafe {
                match action.to_ascii_lowercase().as_str() {
                    "press" | "invoke" => {
                        pattern::<IUIAutomationInvokePattern>(element, UIA_InvokePatternId, "InvokePattern")?
                            .Invoke()?
                    }
                    "toggle" => {
                        pattern::<IUIAutomationTogglePattern>(element, UIA_TogglePatternId, "TogglePattern")?
                            .Toggle()?
                    }
                    "expand" => pattern::<IUIAutomationExpandCollapsePattern>(
                        element,
                        UIA_ExpandCollapsePatternId,
                        "ExpandCollapsePattern",
                    )?
                    .Expand()?,
                    "collapse" => pattern::<IUIAutomationExpandCollapsePattern>(
                        element,
                        UIA_ExpandCollapsePatternId,
                        "ExpandCollapsePattern",
                    )?
                    .Collapse()?,
                    "select" => pattern::<IUIAutomationSelectionItemPattern>(
                        element,
                        UIA_SelectionItemPatternId,
                        "SelectionItemPattern",
                    )?
                    .Select()?,
                    _ => {
                        return Err(UiaxError::NotSupported(format!(
                            "action '{action}' has no UI Automation pattern"
                        )))
                    }
                }
            }
            Ok(())
        })
    }

    fn set_value(&self, handle: &NativeHandle, value: &str) -> Result<(), UiaxError> {
        self.with_state(|_| {
            let element = self.element(handle)?;
            unsafe {
                let p = pattern::<IUIAutomationValuePattern>(element, UIA_ValuePatternId, "ValuePattern")?;
                p.SetValue(&BSTR::from(value))?;
            }
            Ok(())
        })
    }

    fn load_children(&self, handle: &NativeHandle) -> Result<Vec<NativeElement>, UiaxError> {
        self.with_state(|s| {
            let parent = self.element(handle)?;
            let mut children = Vec::new();
            // The walker reports "no more" as an error on a null result.
            let mut next = unsafe { s.walker.GetFirstChildElement(parent) }.ok();
            while let Some(child) = next {
                if children.len() >= self.max_children {
                    log::debug!("load_children: capped at {} children", self.max_children);
                    break;
                }
                next = unsafe { s.walker.GetNextSiblingElement(&child) }.ok();
                children.push(read_element(child, &s.live));
            }
            Ok(children)
        })
    }

    fn close(&self) -> Result<(), UiaxError> {
        self.check_thread()?;
        if let Some(state) = self.state.lock().take() {
            release_state(state);
            log::debug!("uia adapter released automation instance");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Element reads
// ---------------------------------------------------------------------------

fn bstr(read: windows::core::Result<BSTR>) -> String {
    read.map(|b| b.to_string()).unwrap_or_default()
}

fn flag(read: windows::core::Result<BOOL>) -> Option<bool> {
    read.ok().map(BOOL::as_bool)
}

/// Unreadable means enabled, matching the accessibility backend.
fn enabled_or_default(read: windows::core::Result<BOOL>) -> bool {
    flag(read).unwrap_or(true)
}

unsafe fn pattern<T: Interface>(
    element: &IUIAutomationElement,
    id: UIA_PATTERN_ID,
    label: &str,
) -> Result<T, UiaxError> {
    element
        .GetCurrentPattern(id)
        .ok()
        .and_then(|p| p.cast::<T>().ok())
        .ok_or_else(|| UiaxError::NotSupported(format!("element does not support {label}")))
}

/// Read every attribute once and take ownership of `element`.
fn read_element(element: IUIAutomationElement, live: &Arc<AtomicUsize>) -> NativeElement {
    let (control_type, name, rect, enabled, focused, pid, help, automation_id, class_name) = unsafe {
        (
            element
                .CurrentControlType()
                .map(control_type_name)
                .unwrap_or("Unknown"),
            bstr(element.CurrentName()),
            element.CurrentBoundingRectangle().unwrap_or_default(),
            enabled_or_default(element.CurrentIsEnabled()),
            flag(element.CurrentHasKeyboardFocus()).unwrap_or(false),
            element.CurrentProcessId().map(|p| p as u32).unwrap_or(0),
            bstr(element.CurrentHelpText()),
            bstr(element.CurrentAutomationId()),
            bstr(element.CurrentClassName()),
        )
    };
    let value = unsafe {
        pattern::<IUIAutomationValuePattern>(&element, UIA_ValuePatternId, "ValuePattern")
            .map(|p| bstr(p.CurrentValue()))
            .unwrap_or_default()
    };
    let selected = unsafe {
        pattern::<IUIAutomationSelectionItemPattern>(&element, UIA_SelectionItemPatternId, "SelectionItemPattern")
            .ok()
            .and_then(|p| flag(p.CurrentIsSelected()))
            .unwrap_or(false)
    };

    let role = role_from_uia(control_type);
    let mut native = NativeElement::new(NativeHandle::new(UiaRef::new(element, live)));
    if role == Role::Window {
        native.title = name.clone();
    }
    native.role = role;
    native.name = name;
    native.value = value;
    native.description = help;
    native.bounds = Rect::from_ltrb(rect.left, rect.top, rect.right, rect.bottom);
    native.enabled = enabled;
    native.focused = focused;
    native.selected = selected;
    native.pid = pid;
    native
        .attributes
        .insert("control_type".into(), control_type.into());
    if !automation_id.is_empty() {
        native
            .attributes
            .insert("automation_id".into(), automation_id.into());
    }
    if !class_name.is_empty() {
        native.attributes.insert("class_name".into(), class_name.into());
    }
    native
}

/// Map a UIA control type ID to its programmatic name.
fn control_type_name(id: UIA_CONTROLTYPE_ID) -> &'static str {
    match id {
        x if x == UIA_AppBarControlTypeId => "AppBar",
        x if x == UIA_ButtonControlTypeId => "Button",
        x if x == UIA_CalendarControlTypeId => "Calendar",
        x if x == UIA_CheckBoxControlTypeId => "CheckBox",
        x if x == UIA_ComboBoxControlTypeId => "ComboBox",
        x if x == UIA_CustomControlTypeId => "Custom",
        x if x == UIA_DataGridControlTypeId => "DataGrid",
        x if x == UIA_DataItemControlTypeId => "DataItem",
        x if x == UIA_DocumentControlTypeId => "Document",
        x if x == UIA_EditControlTypeId => "Edit",
        x if x == UIA_GroupControlTypeId => "Group",
        x if x == UIA_HeaderControlTypeId => "Header",
        x if x == UIA_HeaderItemControlTypeId => "HeaderItem",
        x if x == UIA_HyperlinkControlTypeId => "Hyperlink",
        x if x == UIA_ImageControlTypeId => "Image",
        x if x == UIA_ListControlTypeId => "List",
        x if x == UIA_ListItemControlTypeId => "ListItem",
        x if x == UIA_MenuBarControlTypeId => "MenuBar",
        x if x == UIA_MenuControlTypeId => "Menu",
        x if x == UIA_MenuItemControlTypeId => "MenuItem",
        x if x == UIA_PaneControlTypeId => "Pane",
        x if x == UIA_ProgressBarControlTypeId => "ProgressBar",
        x if x == UIA_RadioButtonControlTypeId => "RadioButton",
        x if x == UIA_ScrollBarControlTypeId => "ScrollBar",
        x if x == UIA_SeparatorControlTypeId => "Separator",
        x if x == UIA_SliderControlTypeId => "Slider",
        x if x == UIA_SpinnerControlTypeId => "Spinner",
        x if x == UIA_SplitButtonControlTypeId => "SplitButton",
        x if x == UIA_StatusBarControlTypeId => "StatusBar",
        x if x == UIA_TabControlTypeId => "Tab",
        x if x == UIA_TabItemControlTypeId => "TabItem",
        x if x == UIA_TableControlTypeId => "Table",
        x if x == UIA_TextControlTypeId => "Text",
        x if x == UIA_ThumbControlTypeId => "Thumb",
        x if x == UIA_TitleBarControlTypeId => "TitleBar",
        x if x == UIA_ToolBarControlTypeId => "ToolBar",
        x if x == UIA_ToolTipControlTypeId => "ToolTip",
        x if x == UIA_TreeControlTypeId => "Tree",
        x if x == UIA_TreeItemControlTypeId => "TreeItem",
        x if x == UIA_WindowControlTypeId => "Window",
        _ => "Unknown",
    }
}

// ---------------------------------------------------------------------------
// Top-level windows
// ---------------------------------------------------------------------------

fn window_pid(hwnd: HWND) -> u32 {
    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
    pid
}

fn window_title(hwnd: HWND) -> String {
    let len = unsafe { GetWindowTextLengthW(hwnd) };
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u16; (len + 1) as usize];
    let copied = unsafe { GetWindowTextW(hwnd, &mut buf) };
    if copied <= 0 {
        return String::new();
    }
    OsString::from_wide(&buf[..copied as usize])
        .to_string_lossy()
        .into_owned()
}

unsafe extern "system" fn collect_titled(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = unsafe { &mut *(lparam.0 as *mut Vec<HWND>) };
    if is_listed(unsafe { IsWindowVisible(hwnd) }.as_bool(), &window_title(hwnd)) {
        handles.push(hwnd);
    }
    TRUE
}

/// Tool windows count: a process whose only window is a palette still has
/// an application.
fn is_listed(visible: bool, title: &str) -> bool {
    visible && !title.is_empty()
}

/// Visible, titled top-level windows in z-order.
fn titled_windows() -> Result<Vec<HWND>, UiaxError> {
    let mut handles: Vec<HWND> = Vec::with_capacity(64);
    unsafe {
        EnumWindows(
            Some(collect_titled),
            LPARAM(&mut handles as *mut Vec<HWND> as isize),
        )?
    };
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_type_names_map_to_roles() {
        assert_eq!(control_type_name(UIA_ButtonControlTypeId), "Button");
        assert_eq!(role_from_uia(control_type_name(UIA_EditControlTypeId)), Role::TextField);
        assert_eq!(control_type_name(UIA_CONTROLTYPE_ID(0)), "Unknown");
    }

    #[test]
    fn test_off_thread_calls_are_invalid() {
        let adapter = match UiaAdapter::connect(&FinderConfig::default()) {
            Ok(a) => std::sync::Arc::new(a),
            Err(e) => {
                eprintln!("skipping: {e}");
                return;
            }
        };
        let remote = std::sync::Arc::clone(&adapter);
        let result = thread::spawn(move || remote.root().map(|_| ())).join().unwrap();
        assert!(matches!(result, Err(UiaxError::InvalidElement(_))));
        adapter.close().unwrap();
        adapter.close().unwrap();
        assert!(matches!(adapter.root(), Err(UiaxError::InvalidElement(_))));
    }

    #[test]
    fn test_unreadable_enabled_defaults_true() {
        use windows::Win32::Foundation::{E_FAIL, FALSE};
        assert!(enabled_or_default(Err(E_FAIL.into())));
        assert!(enabled_or_default(Ok(TRUE)));
        assert!(!enabled_or_default(Ok(FALSE)));
    }

    #[test]
    fn test_window_listing_needs_visibility_and_title() {
        assert!(is_listed(true, "Palette"));
        assert!(!is_listed(false, "Hidden"));
        assert!(!is_listed(true, ""));
    }

    #[test]
    fn test_close_with_live_elements() {
        let adapter = match UiaAdapter::connect(&FinderConfig::default()) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("skipping: {e}");
                return;
            }
        };
        let live = adapter
            .state
            .lock()
            .as_ref()
            .map(|s| Arc::clone(&s.live))
            .unwrap();
        let root = adapter.root().unwrap();
        assert_eq!(live.load(Ordering::Acquire), 1);
        adapter.close().unwrap();
        drop(root);
        assert_eq!(live.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_titled_windows_enumerates() {
        // Headless CI sessions may have no windows at all.
        assert!(titled_windows().is_ok());
    }
}
