//! Usage: `lock_or_recover` for std mutexes guarding plain data (file maps, one-shot senders).

use std::sync::{Mutex, MutexGuard};

pub(crate) trait MutexExt<T> {
    /// Lock, taking over the data if a previous holder panicked. The poison flag is cleared so
    /// the recovery is logged once.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        let caller = std::panic::Location::caller();
        self.lock().unwrap_or_else(|poisoned| {
            tracing::error!(at = %caller, "recovered poisoned mutex");
            self.clear_poison();
            poisoned.into_inner()
        })
    }
}
