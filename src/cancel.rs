// src/cancel.rs

//! Cooperative cancellation token
//!
//! A cheap, cloneable flag threaded through every resolver stream and parse
//! invocation. Work checks the token at safe points (before opening the
//! next file) and abandons promptly without corrupting shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe the request.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Error out when cancellation has been requested.
    pub fn check(&self) -> crate::error::Result<()> {
        if self.is_canceled() {
            Err(crate::error::Error::Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_propagates_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_canceled());
        assert!(clone.check().is_ok());

        token.cancel();
        assert!(clone.is_canceled());
        assert!(matches!(
            clone.check(),
            Err(crate::error::Error::Canceled)
        ));
    }
}
