//! Cooperative cancellation.
//!
//! Retrieval checks the token before applying side effects; the decay task
//! checks it between batches. Committed batches stay committed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; observers stop at their next checkpoint
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
