//! C ABI library for uiax -- loadable by ctypes, C#, or any FFI consumer.
//!
//! All exported functions follow the convention:
//! - Return `i32` status code: `UIAX_OK = 0`, negative values name the
//!   error kind (`UIAX_NOT_FOUND`, `UIAX_TIMEOUT`, ...)
//! - Structured outputs are JSON strings allocated by Rust, freed via
//!   `uiax_free_string()`
//! - Last error message retrievable via `uiax_last_error()`
//!
//! A finder is an opaque pointer from `uiax_finder_new()`, released with
//! `uiax_finder_free()`.  On Windows it must stay on the thread that
//! created it.

use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use uiax_core::tree::{self, ElementSnapshot};
use uiax_core::{CancelToken, Element, ErrorKind, Finder, FinderConfig, Selector, SelectorSpec, UiaxError};

pub const UIAX_OK: i32 = 0;
pub const UIAX_NOT_SUPPORTED: i32 = -1;
pub const UIAX_PERMISSION_DENIED: i32 = -2;
pub const UIAX_NOT_FOUND: i32 = -3;
pub const UIAX_NO_BOUNDS: i32 = -4;
pub const UIAX_INVALID_ELEMENT: i32 = -5;
pub const UIAX_TIMEOUT: i32 = -6;
pub const UIAX_NO_FOCUS: i32 = -7;
pub const UIAX_CANCELLED: i32 = -8;
pub const UIAX_GENERIC: i32 = -9;
/// Null pointer, bad UTF-8 or malformed JSON argument.
pub const UIAX_INVALID_ARGUMENT: i32 = -10;

/// Opaque finder handle.
pub struct UiaxFinder(Finder);

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Status code for an error kind.
pub fn status_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotSupported => UIAX_NOT_SUPPORTED,
        ErrorKind::PermissionDenied => UIAX_PERMISSION_DENIED,
        ErrorKind::NotFound => UIAX_NOT_FOUND,
        ErrorKind::NoBounds => UIAX_NO_BOUNDS,
        ErrorKind::InvalidElement => UIAX_INVALID_ELEMENT,
        ErrorKind::Timeout => UIAX_TIMEOUT,
        ErrorKind::NoFocus => UIAX_NO_FOCUS,
        ErrorKind::Cancelled => UIAX_CANCELLED,
        ErrorKind::Generic => UIAX_GENERIC,
    }
}

fn fail(err: &UiaxError) -> i32 {
    set_last_error(&err.to_string());
    status_for(err.kind())
}

fn invalid(msg: &str) -> i32 {
    set_last_error(msg);
    UIAX_INVALID_ARGUMENT
}

/// Hand `text` to the caller through `out`.
unsafe fn write_out(out: *mut *mut c_char, text: String) -> i32 {
    match CString::new(text) {
        Ok(cstr) => {
            unsafe { *out = cstr.into_raw() };
            UIAX_OK
        }
        Err(e) => invalid(&format!("CString conversion failed: {e}")),
    }
}

unsafe fn write_json<T: serde::Serialize + ?Sized>(out: *mut *mut c_char, value: &T) -> i32 {
    match serde_json::to_string(value) {
        Ok(json) => unsafe { write_out(out, json) },
        Err(e) => invalid(&format!("JSON serialization failed: {e}")),
    }
}

/// Borrow an optional C string; null maps to `None`.
unsafe fn opt_str<'a>(s: *const c_char) -> Result<Option<&'a str>, i32> {
    if s.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(s) }
        .to_str()
        .map(Some)
        .map_err(|e| invalid(&format!("Invalid UTF-8: {e}")))
}

unsafe fn parse_selector(json: *const c_char) -> Result<Selector, i32> {
    let Some(json) = (unsafe { opt_str(json)? }) else {
        return Err(invalid("selector_json is null"));
    };
    serde_json::from_str::<SelectorSpec>(json)
        .map(Selector::from)
        .map_err(|e| invalid(&format!("Invalid selector: {e}")))
}

unsafe fn finder_ref<'a>(finder: *const UiaxFinder) -> Result<&'a Finder, i32> {
    if finder.is_null() {
        return Err(invalid("finder is null"));
    }
    Ok(unsafe { &(*finder).0 })
}

/// Resolve `pid` to an application, or the focused one when `pid == 0`.
fn scope(finder: &Finder, pid: u32) -> Result<Arc<Element>, UiaxError> {
    if pid == 0 {
        finder.focused_application()
    } else {
        finder.application_by_pid(pid)
    }
}

macro_rules! try_status {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(code) => return code,
        }
    };
}

// ---------------------------------------------------------------------------
// Errors and memory
// ---------------------------------------------------------------------------

/// Retrieve the last error message (thread-local).
///
/// Returns a pointer valid until the next uiax_* call on this thread.
/// Returns null if no error has occurred.
#[no_mangle]
pub extern "C" fn uiax_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Free a string previously allocated by a uiax_* function.
///
/// # Safety
///
/// `ptr` must be a pointer returned by a uiax_* function or null.
#[no_mangle]
pub unsafe extern "C" fn uiax_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

// ---------------------------------------------------------------------------
// Finder lifecycle
// ---------------------------------------------------------------------------

/// Create a finder.  `config_json` may be null for defaults.
///
/// # Safety
///
/// `config_json` must be null or a valid null-terminated UTF-8 C string.
/// `out_finder` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn uiax_finder_new(
    config_json: *const c_char,
    out_finder: *mut *mut UiaxFinder,
) -> i32 {
    if out_finder.is_null() {
        return invalid("out_finder is null");
    }
    let config = match unsafe { opt_str(config_json) } {
        Ok(None) => FinderConfig::default(),
        Ok(Some(json)) => match FinderConfig::from_json(json) {
            Ok(cfg) => cfg,
            Err(e) => return invalid(&format!("Invalid config: {e}")),
        },
        Err(code) => return code,
    };

    match Finder::with_config(config) {
        Ok(finder) => {
            unsafe { *out_finder = Box::into_raw(Box::new(UiaxFinder(finder))) };
            UIAX_OK
        }
        Err(e) => fail(&e),
    }
}

/// Release the finder's native resources.  Idempotent.
///
/// # Safety
///
/// `finder` must be a live pointer from `uiax_finder_new()`.
#[no_mangle]
pub unsafe extern "C" fn uiax_finder_close(finder: *mut UiaxFinder) -> i32 {
    let finder = try_status!(unsafe { finder_ref(finder) });
    match finder.close() {
        Ok(()) => UIAX_OK,
        Err(e) => fail(&e),
    }
}

/// Close and deallocate a finder.
///
/// # Safety
///
/// `finder` must be null or a pointer from `uiax_finder_new()` that has
/// not been freed.
#[no_mangle]
pub unsafe extern "C" fn uiax_finder_free(finder: *mut UiaxFinder) {
    if !finder.is_null() {
        drop(unsafe { Box::from_raw(finder) });
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Running applications as a JSON array of element snapshots (no
/// children).
///
/// # Safety
///
/// `finder` must be live; `out_json` must be a valid pointer.  Free the
/// result with `uiax_free_string()`.
#[no_mangle]
pub unsafe extern "C" fn uiax_applications_json(
    finder: *const UiaxFinder,
    out_json: *mut *mut c_char,
) -> i32 {
    let finder = try_status!(unsafe { finder_ref(finder) });
    if out_json.is_null() {
        return invalid("out_json is null");
    }
    let cancel = CancelToken::new();
    let apps = match finder.all_applications() {
        Ok(apps) => apps,
        Err(e) => return fail(&e),
    };
    let snaps: Result<Vec<ElementSnapshot>, UiaxError> =
        apps.iter().map(|app| tree::snapshot(app, 1, &cancel)).collect();
    match snaps {
        Ok(snaps) => unsafe { write_json(out_json, &snaps) },
        Err(e) => fail(&e),
    }
}

/// Find elements matching a JSON selector (see `SelectorSpec`) under the
/// application `pid` (`0` = focused application).
///
/// With `all != 0` every match is returned, otherwise the first.  With
/// `timeout_ms > 0` a first-match query polls until the deadline.  Output
/// is a JSON array of snapshots, each `max_depth` levels deep
/// (`0` = unlimited).
///
/// # Safety
///
/// `finder` must be live; `selector_json` must be a valid C string;
/// `out_json` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn uiax_find_json(
    finder: *const UiaxFinder,
    selector_json: *const c_char,
    pid: u32,
    all: i32,
    timeout_ms: u64,
    max_depth: usize,
    out_json: *mut *mut c_char,
) -> i32 {
    let finder = try_status!(unsafe { finder_ref(finder) });
    let selector = try_status!(unsafe { parse_selector(selector_json) });
    if out_json.is_null() {
        return invalid("out_json is null");
    }

    let cancel = CancelToken::new();
    let found = (|| {
        if all == 0 && timeout_ms > 0 {
            let timeout = Duration::from_millis(timeout_ms);
            return finder
                .wait_for_with(|| scope(finder, pid), &selector, timeout, &cancel)
                .map(|e| vec![e]);
        }
        let root = if pid == 0 { None } else { Some(scope(finder, pid)?) };
        let root = root.as_ref();
        if all != 0 {
            finder.find_all_in(root, &selector, &cancel)
        } else {
            finder.find_in(root, &selector, &cancel).map(|e| vec![e])
        }
    })();
    let snaps: Result<Vec<ElementSnapshot>, UiaxError> = found.and_then(|elements| {
        elements
            .iter()
            .map(|e| tree::snapshot(e, max_depth, &cancel))
            .collect()
    });
    match snaps {
        Ok(snaps) => unsafe { write_json(out_json, &snaps) },
        Err(e) => fail(&e),
    }
}

/// Render the application `pid` (`0` = focused application) as box-drawn
/// text, `max_depth` levels deep (`0` = unlimited).
///
/// # Safety
///
/// `finder` must be live; `out_text` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn uiax_print_tree(
    finder: *const UiaxFinder,
    pid: u32,
    max_depth: usize,
    out_text: *mut *mut c_char,
) -> i32 {
    let finder = try_status!(unsafe { finder_ref(finder) });
    if out_text.is_null() {
        return invalid("out_text is null");
    }
    let text = scope(finder, pid).and_then(|root| tree::print_tree(&root, max_depth, &CancelToken::new()));
    match text {
        Ok(text) => unsafe { write_out(out_text, text) },
        Err(e) => fail(&e),
    }
}

/// Snapshot the application `pid` (`0` = focused application) as JSON.
///
/// # Safety
///
/// `finder` must be live; `out_json` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn uiax_snapshot_json(
    finder: *const UiaxFinder,
    pid: u32,
    max_depth: usize,
    out_json: *mut *mut c_char,
) -> i32 {
    let finder = try_status!(unsafe { finder_ref(finder) });
    if out_json.is_null() {
        return invalid("out_json is null");
    }
    let snap = scope(finder, pid).and_then(|root| tree::snapshot(&root, max_depth, &CancelToken::new()));
    match snap {
        Ok(snap) => unsafe { write_json(out_json, &snap) },
        Err(e) => fail(&e),
    }
}
