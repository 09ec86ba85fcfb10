//! Cooperative cancellation.

use crate::{CoreError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation flag shared between a request handler and the work it
/// drives. Long-running loops poll it at suspension points; pack resolution
/// checks it before every pass.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Creates a signal in the not-aborted state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the signal; every clone observes the abort.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    /// Returns true once `abort` has been called.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Returns `Err(Aborted)` once `abort` has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(CoreError::Aborted)
        } else {
            Ok(())
        }
    }
}
