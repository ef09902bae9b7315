//! Lock helper that recovers from poisoning.
//!
//! A worker thread that panics mid-update must not take the UI thread down
//! with it; the queue state is still readable and the next mutation
//! rewrites it anyway.

use std::sync::{Mutex, MutexGuard};

/// Acquire a mutex, recovering the guard if a previous holder panicked.
pub fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!("queue lock was poisoned by a panicking thread, recovering");
            poisoned.into_inner()
        }
    }
}
