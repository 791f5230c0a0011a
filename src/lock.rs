use std::sync::{Mutex, MutexGuard};

/// Lock `lock`, taking the data back from a poisoned mutex.
///
/// A panic on the delivery or fan-out thread must not wedge `stop()`, so the
/// gated writer and device slots are always reachable afterwards.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        crate::log_debug(&format!("{what} mutex poisoned by a panicked thread; recovering"));
        poisoned.into_inner()
    })
}
