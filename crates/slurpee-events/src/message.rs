//! Bus message variants.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The three activity notifications the delivery engine emits. Consumed by
/// the SSE streaming endpoint, which is out of scope here - only the bus
/// contract (ordering per-subscriber, non-blocking publish) is specified.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    Created {
        event_id: Uuid,
        subject: String,
    },
    StatusChanged {
        event_id: Uuid,
        status: String,
    },
    DeliveryAttempt {
        event_id: Uuid,
        subscriber_id: Uuid,
        status: String,
        response_status_code: Option<i32>,
    },
}

/// An envelope around a [`BusEvent`] carrying the bus's own monotonic id
/// and publish timestamp. The id is an in-memory sequence counter; it is
/// never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct BusMessage {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: BusEvent,
}
