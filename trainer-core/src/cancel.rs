//! Cooperative cancellation shared between a session worker and its owner.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A set-once stop signal. Clones share the same flag; once cancelled it
/// stays cancelled, so a new session needs a new token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
