//! Free-for-send signal
//!
//! Wakes senders blocked until the state machine accepts a new request.
//! Waiters re-check the machine state after every wake or timeout, so a
//! missed notification only costs one wait interval.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub(crate) struct FreeSignal {
    /// Set by `notify`, cleared by the waiter that consumes it
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl FreeSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn notify(&self) {
        *self.signaled.lock() = true;
        self.condvar.notify_all();
    }

    /// Wait for a notification, at most `timeout`.
    ///
    /// Returns true if notified.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            self.condvar.wait_for(&mut signaled, timeout);
        }
        std::mem::replace(&mut *signaled, false)
    }
}
