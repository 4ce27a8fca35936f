//! Process-local pub/sub fan-out to SSE subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::message::{BusEvent, BusMessage};

/// Bounded buffer size per subscriber. A full buffer drops the message for
/// that subscriber only - slow consumers never back-pressure the broker.
const SUBSCRIBER_BUFFER: usize = 64;

struct Inner {
    subscribers: DashMap<Uuid, mpsc::Sender<Arc<BusMessage>>>,
    next_id: AtomicU64,
}

/// In-memory broker for `created` / `status_changed` / `delivery_attempt`
/// notifications.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a new subscriber. Returns a receiver for its messages and a
    /// guard that unregisters it when dropped.
    pub fn subscribe(&self) -> (mpsc::Receiver<Arc<BusMessage>>, Unsubscribe) {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.inner.subscribers.insert(id, tx);
        (
            rx,
            Unsubscribe {
                bus: self.inner.clone(),
                id,
            },
        )
    }

    /// Fan out an event to every current subscriber. Never blocks: a
    /// subscriber whose buffer is full simply misses this message.
    pub fn publish(&self, event: BusEvent) {
        let message = Arc::new(BusMessage {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: chrono::Utc::now(),
            event,
        });

        for entry in self.inner.subscribers.iter() {
            if entry.value().try_send(message.clone()).is_err() {
                tracing::debug!(subscriber_id = %entry.key(), "bus subscriber buffer full or closed, dropping message");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop guard returned by [`EventBus::subscribe`]; removes the subscriber's
/// channel from the bus when dropped.
pub struct Unsubscribe {
    bus: Arc<Inner>,
    id: Uuid,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.bus.subscribers.remove(&self.id);
    }
}
