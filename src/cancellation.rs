//! A minimal cancellation facility. Spec section 5 treats "the
//! cancellation/progress facility" as an external collaborator; this
//! gives it the smallest concrete shape the engine needs: a flag a
//! caller can raise from another thread, and a check-point the
//! preparation phase of `update` polls between steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{IndexError, Result};

/// A cooperative cancellation flag, cheaply cloneable via `Arc`.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Called between steps of the preparation phase (section 5,
    /// "Cancellation"). Raises [`IndexError::Cancelled`] once
    /// cancellation has been requested; a no-op otherwise.
    pub fn check_point(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(IndexError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(token.check_point().is_ok());
    }

    #[test]
    fn cancel_trips_the_check_point() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(token.check_point(), Err(IndexError::Cancelled)));
    }

    #[test]
    fn clones_share_the_same_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
