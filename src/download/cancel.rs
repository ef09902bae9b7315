//! Cooperative cancellation
//!
//! Workers poll the flag between chunks and between queue items; nothing is
//! ever force-killed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancel signal. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the same handle can guard the next run
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancelFlag::new();
        let seen_by_worker = flag.clone();
        assert!(!seen_by_worker.is_cancelled());

        flag.cancel();
        assert!(seen_by_worker.is_cancelled());

        seen_by_worker.reset();
        assert!(!flag.is_cancelled());
    }
}
