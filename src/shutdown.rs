use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// An advisory shutdown flag that can also be awaited. Triggering is idempotent.
#[derive(Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> ShutdownSignal {
        Default::default()
    }

    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Completes once the signal is triggered, immediately if it was triggered before
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // register before checking the flag, otherwise a trigger in between would be missed
        notified.as_mut().enable();

        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}
