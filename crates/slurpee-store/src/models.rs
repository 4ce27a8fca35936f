//! Row and domain types for the broker's persisted tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// Event delivery status. Stored as `TEXT` in Postgres (cast at query time)
/// rather than a native enum, so an unrecognized value round-trips as
/// [`DeliveryStatus::Unknown`] instead of failing the row decode - the
/// resumer treats that as a non-terminal warning rather than a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Partial,
    Delivered,
    Recorded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Partial => "partial",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Recorded => "recorded",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Recorded | DeliveryStatus::Failed
        )
    }
}

impl From<&str> for DeliveryStatus {
    fn from(value: &str) -> Self {
        match value {
            "pending" => DeliveryStatus::Pending,
            "partial" => DeliveryStatus::Partial,
            "delivered" => DeliveryStatus::Delivered,
            "recorded" => DeliveryStatus::Recorded,
            "failed" => DeliveryStatus::Failed,
            _ => DeliveryStatus::Unknown,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of a single HTTP delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Succeeded,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Succeeded => "succeeded",
            AttemptStatus::Failed => "failed",
        }
    }
}

impl From<&str> for AttemptStatus {
    fn from(value: &str) -> Self {
        match value {
            "succeeded" => AttemptStatus::Succeeded,
            _ => AttemptStatus::Failed,
        }
    }
}

/// An event as persisted by the broker. Identity fields are immutable once
/// written; `delivery_status`, `retry_count` and `status_updated_at` are the
/// only mutable fields.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub trace_id: Option<Uuid>,
    pub data: Json,
    pub retry_count: i32,
    #[sqlx(rename = "delivery_status")]
    #[serde(rename = "delivery_status")]
    pub delivery_status_raw: String,
    pub status_updated_at: DateTime<Utc>,
}

impl Event {
    pub fn delivery_status(&self) -> DeliveryStatus {
        DeliveryStatus::from(self.delivery_status_raw.as_str())
    }
}

/// Fields required to insert a new event. `id`/`timestamp` are filled in by
/// the ingest handler before persistence.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: Uuid,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub trace_id: Option<Uuid>,
    pub data: Json,
}

/// A webhook endpoint that events may be fanned out to.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub name: String,
    pub endpoint_url: String,
    #[serde(skip_serializing)]
    pub auth_secret: String,
    pub max_parallel: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted by the subscriber upsert endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberUpsert {
    pub name: String,
    pub endpoint_url: String,
    pub auth_secret: String,
    #[serde(default)]
    pub max_parallel: Option<i32>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionUpsert>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionUpsert {
    pub subject_pattern: String,
    #[serde(default)]
    pub filter: Option<Json>,
    #[serde(default)]
    pub max_retries: Option<i32>,
}

/// A subscriber's registered interest in events matching a subject pattern.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub subject_pattern: String,
    pub filter: Option<Json>,
    pub max_retries: Option<i32>,
}

/// A single append-only record of one HTTP call to a subscriber endpoint.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub event_id: Uuid,
    pub subscriber_id: Uuid,
    pub endpoint_url: String,
    pub attempted_at: DateTime<Utc>,
    pub request_headers: Json,
    pub response_status_code: Option<i32>,
    pub response_headers: Json,
    pub response_body: String,
    #[sqlx(rename = "status")]
    #[serde(rename = "status")]
    pub status_raw: String,
}

impl DeliveryAttempt {
    pub fn status(&self) -> AttemptStatus {
        AttemptStatus::from(self.status_raw.as_str())
    }
}

/// Fields required to record a new delivery attempt.
#[derive(Debug, Clone)]
pub struct NewDeliveryAttempt {
    pub event_id: Uuid,
    pub subscriber_id: Uuid,
    pub endpoint_url: String,
    pub attempted_at: DateTime<Utc>,
    pub request_headers: Json,
    pub response_status_code: Option<i32>,
    pub response_headers: Json,
    pub response_body: String,
    pub status: AttemptStatus,
}

/// Per-subscriber counts of succeeded/failed attempts for one event, used by
/// the resumer to reconstruct in-flight retry state.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriberDeliverySummary {
    pub subscriber_id: Uuid,
    pub succeeded_count: i64,
    pub failed_count: i64,
}

/// A secret used to authenticate publishers.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiSecret {
    pub id: Uuid,
    pub name: String,
    pub secret_hash: String,
    pub subject_pattern: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_strings_do_not_panic() {
        assert_eq!(DeliveryStatus::from("this-is-not-real"), DeliveryStatus::Unknown);
        assert!(!DeliveryStatus::Unknown.is_terminal());
    }

    #[test]
    fn terminal_statuses_are_exactly_the_three_named_in_spec() {
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::Recorded.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::Partial.is_terminal());
    }
}
