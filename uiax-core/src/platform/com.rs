//! COM apartment RAII guard for the UI Automation backend.
//!
//! [`ComGuard`] pairs `CoInitializeEx` with `CoUninitialize` on the thread
//! that created it.  The `PhantomData<*const ()>` field makes the guard
//! `!Send` + `!Sync`, so the balancing call can only run on the
//! initializing thread.

use std::marker::PhantomData;

use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use crate::errors::UiaxError;

/// Keeps the calling thread's COM apartment alive.
#[must_use = "COM is uninitialized as soon as the guard drops"]
pub struct ComGuard {
    should_uninit: bool,
    _not_send: PhantomData<*const ()>,
}

impl ComGuard {
    /// Join (or create) the thread's MTA.
    ///
    /// A thread that already entered an STA keeps it: COM stays usable, but
    /// the guard then must not call `CoUninitialize`.
    pub fn init() -> Result<Self, UiaxError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };

        if hr.is_ok() {
            // S_OK or S_FALSE; both need a balancing uninit.
            return Ok(Self {
                should_uninit: true,
                _not_send: PhantomData,
            });
        }
        if hr == RPC_E_CHANGED_MODE {
            log::warn!("CoInitializeEx: thread already has an STA apartment, using it");
            return Ok(Self {
                should_uninit: false,
                _not_send: PhantomData,
            });
        }
        Err(UiaxError::generic(
            hr.0,
            format!("CoInitializeEx failed: HRESULT 0x{:08X}", hr.0 as u32),
        ))
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.should_uninit {
            unsafe { CoUninitialize() };
        }
    }
}
