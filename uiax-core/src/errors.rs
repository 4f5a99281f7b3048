//! Error types for `uiax_core`.
//!
//! Every backend funnels its failures through [`UiaxError`], a small closed
//! taxonomy derived with `thiserror`.  Native failure codes (HRESULTs,
//! `AXError` values) survive inside [`UiaxError::Generic`] so callers can
//! still inspect what the OS reported.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the `uiax_core` library.
#[derive(Debug, Error)]
pub enum UiaxError {
    /// The operation is not implemented on this backend or platform.
    #[error("NotSupported: {0}")]
    NotSupported(String),

    /// The process has not been granted accessibility trust.
    #[error("PermissionDenied: accessibility access has not been granted")]
    PermissionDenied,

    /// A query or enumeration yielded no result.
    #[error("NotFound: {0}")]
    NotFound(String),

    /// The element has no valid bounds.
    #[error("NoBounds: element has no valid bounds")]
    NoBounds,

    /// Null or released handle, wrong thread, or use after `close`.
    #[error("InvalidElement: {0}")]
    InvalidElement(String),

    /// A `wait_for` deadline passed without a match.
    #[error("Timeout: no match within {0:?}")]
    Timeout(Duration),

    /// Nothing currently holds keyboard focus.
    #[error("NoFocus: no element has keyboard focus")]
    NoFocus,

    /// The caller's cancellation token was tripped.
    #[error("Cancelled")]
    Cancelled,

    /// A native API call failed with an OS-supplied code.
    #[error("Generic: {message} (code {code})")]
    Generic { code: i64, message: String },
}

/// Fieldless discriminant of [`UiaxError`], stable across the FFI and
/// Python surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotSupported,
    PermissionDenied,
    NotFound,
    NoBounds,
    InvalidElement,
    Timeout,
    NoFocus,
    Cancelled,
    Generic,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoBounds => "no_bounds",
            ErrorKind::InvalidElement => "invalid_element",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NoFocus => "no_focus",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Generic => "generic",
        }
    }
}

impl UiaxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UiaxError::NotSupported(_) => ErrorKind::NotSupported,
            UiaxError::PermissionDenied => ErrorKind::PermissionDenied,
            UiaxError::NotFound(_) => ErrorKind::NotFound,
            UiaxError::NoBounds => ErrorKind::NoBounds,
            UiaxError::InvalidElement(_) => ErrorKind::InvalidElement,
            UiaxError::Timeout(_) => ErrorKind::Timeout,
            UiaxError::NoFocus => ErrorKind::NoFocus,
            UiaxError::Cancelled => ErrorKind::Cancelled,
            UiaxError::Generic { .. } => ErrorKind::Generic,
        }
    }

    /// Build a [`UiaxError::Generic`] from a native code and a message.
    pub fn generic(code: impl Into<i64>, message: impl Into<String>) -> Self {
        UiaxError::Generic {
            code: code.into(),
            message: message.into(),
        }
    }

    pub(crate) fn closed() -> Self {
        UiaxError::InvalidElement("finder has been closed".into())
    }
}

/// Convert a `windows::core::Error` (COM / Win32 HRESULT failure) into a
/// [`UiaxError::Generic`] carrying the HRESULT.
#[cfg(windows)]
impl From<windows::core::Error> for UiaxError {
    fn from(err: windows::core::Error) -> Self {
        UiaxError::Generic {
            code: i64::from(err.code().0),
            message: format!("Windows COM error: {err}"),
        }
    }
}

/// Map an accessibility `AXError` onto the taxonomy.  Codes without a
/// dedicated kind stay inspectable inside [`UiaxError::Generic`].
#[cfg(target_os = "macos")]
impl From<objc2_application_services::AXError> for UiaxError {
    fn from(err: objc2_application_services::AXError) -> Self {
        use objc2_application_services::AXError;
        match err {
            AXError::APIDisabled => UiaxError::PermissionDenied,
            AXError::InvalidUIElement => {
                UiaxError::InvalidElement("accessibility element no longer exists".into())
            }
            AXError::ActionUnsupported => {
                UiaxError::NotSupported("action not supported by element".into())
            }
            AXError::AttributeUnsupported => {
                UiaxError::NotSupported("attribute not supported by element".into())
            }
            other => UiaxError::generic(other.0, format!("AXError {}", other.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(UiaxError::PermissionDenied.kind(), ErrorKind::PermissionDenied);
        assert_eq!(UiaxError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(UiaxError::generic(5, "boom").kind(), ErrorKind::Generic);
        assert_eq!(UiaxError::closed().kind(), ErrorKind::InvalidElement);
    }

    #[test]
    fn test_generic_display_contains_code() {
        let err = UiaxError::generic(-25204, "AXUIElementCopyAttributeValue failed");
        let text = err.to_string();
        assert!(text.contains("-25204"));
        assert!(text.contains("AXUIElementCopyAttributeValue"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidElement).unwrap();
        assert_eq!(json, "\"invalid_element\"");
        assert_eq!(ErrorKind::NoFocus.as_str(), "no_focus");
    }
}
