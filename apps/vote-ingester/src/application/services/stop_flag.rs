//! Stop Flag
//!
//! One-way boolean shared by the supervisor and the shutdown coordinator.
//! It starts false and, once set, never goes back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Monotonic stop flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `true` if this call was the one that set it.
    pub fn set(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    /// Whether the flag has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
