//! Tracks outstanding work (tasks plus armed retry timers) so shutdown
//! can wait for it to reach zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct InFlight {
    count: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl InFlight {
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// +1, to be paired with exactly one `decrement` - called when a task
    /// is enqueued and again when a retry timer is armed.
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Waits until the count reaches zero. Safe to call concurrently with
    /// further increments - each zero-crossing re-notifies waiters, so a
    /// caller that raced a fresh increment simply loops back around.
    pub async fn wait_zero(&self) {
        loop {
            if self.count() == 0 {
                return;
            }
            let notified = self.notify.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}
