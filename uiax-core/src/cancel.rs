//! Caller-owned cancellation signal for blocking queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::UiaxError;

/// Cloneable cancellation flag.
///
/// Clones share state: tripping any clone cancels every walk and
/// `wait_for` loop that was handed one of them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has been tripped.
    pub fn check(&self) -> Result<(), UiaxError> {
        if self.is_cancelled() {
            Err(UiaxError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(UiaxError::Cancelled)));
    }
}
