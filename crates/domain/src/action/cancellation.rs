//! Cooperative cancellation flag handed to action bodies.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::sync::lock;

/// Shared flag set by [`Action::cancel`](super::Action::cancel).
///
/// Bodies poll [`is_cancelled`](Self::is_cancelled) or wait through
/// [`sleep`](Self::sleep), which wakes early on cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake sleepers. Idempotent.
    pub fn cancel(&self) {
        let (flag, wakeup) = &*self.inner;
        *lock(flag) = true;
        wakeup.notify_all();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Block for up to `duration`. Returns `true` if cancelled.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, wakeup) = &*self.inner;
        let guard = lock(flag);
        let (guard, _timeout) = wakeup
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}
