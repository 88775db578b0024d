use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A notification that fires at most once.
///
/// Clones share the same state. The first call to [`CloseSignal::signal`]
/// flips the flag and wakes every waiter; later calls do nothing.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Returns `true` only for the call that fired it.
    pub fn signal(&self) -> bool {
        let won = self
            .inner
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if won {
            self.inner.notify.notify_waiters();
        }
        won
    }

    pub fn is_signaled(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Resolves once the signal has fired, immediately if it already has.
    pub async fn wait(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // register before checking the flag so a concurrent signal is not missed
        notified.as_mut().enable();

        if self.is_signaled() {
            return;
        }
        notified.await;
    }
}
