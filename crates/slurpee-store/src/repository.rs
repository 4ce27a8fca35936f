//! The [`Store`] trait and its Postgres implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use slurpee_core::error::{Error, Result};

use crate::models::*;

/// Persistence contract consumed by the ingest handler, the subscription
/// cache, the dispatcher and the resumer. Narrow by design: admin
/// CRUD beyond upsert/delete, schema migrations and the dashboard all live
/// outside this trait.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap liveness probe for the readiness endpoint - does not need to
    /// touch any particular table, just prove the pool can still reach
    /// Postgres.
    async fn health_check(&self) -> Result<()>;

    async fn insert_event(&self, event: NewEvent) -> Result<Event>;
    async fn get_event(&self, id: Uuid) -> Result<Option<Event>>;
    async fn set_event_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        retry_count: Option<i32>,
    ) -> Result<()>;
    /// Events whose `delivery_status` is `pending` or `partial`, consumed by
    /// the startup resumer.
    async fn resumable_events(&self) -> Result<Vec<Event>>;

    async fn insert_delivery_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt>;
    /// Per-subscriber succeeded/failed attempt counts for one event, used to
    /// reconstruct retry state for `partial` events on resume.
    async fn delivery_summary(&self, event_id: Uuid) -> Result<Vec<SubscriberDeliverySummary>>;

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>>;
    async fn get_subscriber(&self, id: Uuid) -> Result<Option<Subscriber>>;
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;
    /// Upsert a subscriber by `endpoint_url` and replace its subscription
    /// set: add new patterns, update existing ones in place, delete
    /// patterns no longer present.
    async fn upsert_subscriber(&self, upsert: SubscriberUpsert) -> Result<Subscriber>;
    async fn delete_subscriber(&self, id: Uuid) -> Result<()>;

    async fn get_api_secret(&self, id: Uuid) -> Result<Option<ApiSecret>>;
}

/// Postgres-backed implementation of [`Store`].
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| Error::database_with_source("readiness check failed", e))
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event> {
        sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (id, subject, "timestamp", trace_id, data, retry_count, delivery_status, status_updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, 'pending', now())
            RETURNING id, subject, "timestamp", trace_id, data, retry_count, delivery_status, status_updated_at
            "#,
        )
        .bind(event.id)
        .bind(event.subject)
        .bind(event.timestamp)
        .bind(event.trace_id)
        .bind(event.data)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to insert event", e))
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, subject, "timestamp", trace_id, data, retry_count, delivery_status, status_updated_at
            FROM events WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to load event", e))
    }

    async fn set_event_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        retry_count: Option<i32>,
    ) -> Result<()> {
        let result = if let Some(retry_count) = retry_count {
            sqlx::query(
                "UPDATE events SET delivery_status = $2, retry_count = $3, status_updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(status.as_str())
            .bind(retry_count)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                "UPDATE events SET delivery_status = $2, status_updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
        };

        result
            .map(|_| ())
            .map_err(|e| Error::database_with_source("failed to update event status", e))
    }

    async fn resumable_events(&self) -> Result<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, subject, "timestamp", trace_id, data, retry_count, delivery_status, status_updated_at
            FROM events WHERE delivery_status IN ('pending', 'partial')
            ORDER BY "timestamp" ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to load resumable events", e))
    }

    async fn insert_delivery_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt> {
        sqlx::query_as::<_, DeliveryAttempt>(
            r#"
            INSERT INTO delivery_attempts
                (event_id, subscriber_id, endpoint_url, attempted_at, request_headers,
                 response_status_code, response_headers, response_body, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, event_id, subscriber_id, endpoint_url, attempted_at, request_headers,
                      response_status_code, response_headers, response_body, status
            "#,
        )
        .bind(attempt.event_id)
        .bind(attempt.subscriber_id)
        .bind(attempt.endpoint_url)
        .bind(attempt.attempted_at)
        .bind(attempt.request_headers)
        .bind(attempt.response_status_code)
        .bind(attempt.response_headers)
        .bind(attempt.response_body)
        .bind(attempt.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to record delivery attempt", e))
    }

    async fn delivery_summary(&self, event_id: Uuid) -> Result<Vec<SubscriberDeliverySummary>> {
        sqlx::query_as::<_, SubscriberDeliverySummary>(
            r#"
            SELECT
                subscriber_id,
                COUNT(*) FILTER (WHERE status = 'succeeded') AS succeeded_count,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed_count
            FROM delivery_attempts
            WHERE event_id = $1
            GROUP BY subscriber_id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to summarize delivery attempts", e))
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        sqlx::query_as::<_, Subscriber>(
            "SELECT id, name, endpoint_url, auth_secret, max_parallel, created_at, updated_at FROM subscribers",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to list subscribers", e))
    }

    async fn get_subscriber(&self, id: Uuid) -> Result<Option<Subscriber>> {
        sqlx::query_as::<_, Subscriber>(
            "SELECT id, name, endpoint_url, auth_secret, max_parallel, created_at, updated_at FROM subscribers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to load subscriber", e))
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        sqlx::query_as::<_, Subscription>(
            "SELECT id, subscriber_id, subject_pattern, filter, max_retries FROM subscriptions",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to list subscriptions", e))
    }

    async fn upsert_subscriber(&self, upsert: SubscriberUpsert) -> Result<Subscriber> {
        let max_parallel = upsert.max_parallel.unwrap_or(4).max(1);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::database_with_source("failed to start transaction", e))?;

        let subscriber = sqlx::query_as::<_, Subscriber>(
            r#"
            INSERT INTO subscribers (name, endpoint_url, auth_secret, max_parallel)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (endpoint_url) DO UPDATE SET
                name = EXCLUDED.name,
                auth_secret = EXCLUDED.auth_secret,
                max_parallel = EXCLUDED.max_parallel,
                updated_at = now()
            RETURNING id, name, endpoint_url, auth_secret, max_parallel, created_at, updated_at
            "#,
        )
        .bind(&upsert.name)
        .bind(&upsert.endpoint_url)
        .bind(&upsert.auth_secret)
        .bind(max_parallel)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::database_with_source("failed to upsert subscriber", e))?;

        let keep_patterns: Vec<String> = upsert
            .subscriptions
            .iter()
            .map(|s| s.subject_pattern.clone())
            .collect();

        sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = $1 AND NOT (subject_pattern = ANY($2))")
            .bind(subscriber.id)
            .bind(&keep_patterns)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database_with_source("failed to prune subscriptions", e))?;

        for sub in &upsert.subscriptions {
            sqlx::query(
                r#"
                INSERT INTO subscriptions (subscriber_id, subject_pattern, filter, max_retries)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (subscriber_id, subject_pattern) DO UPDATE SET
                    filter = EXCLUDED.filter,
                    max_retries = EXCLUDED.max_retries
                "#,
            )
            .bind(subscriber.id)
            .bind(&sub.subject_pattern)
            .bind(&sub.filter)
            .bind(sub.max_retries)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database_with_source("failed to upsert subscription", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::database_with_source("failed to commit subscriber upsert", e))?;

        Ok(subscriber)
    }

    async fn delete_subscriber(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM subscribers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database_with_source("failed to delete subscriber", e))?;
        Ok(())
    }

    async fn get_api_secret(&self, id: Uuid) -> Result<Option<ApiSecret>> {
        sqlx::query_as::<_, ApiSecret>(
            "SELECT id, name, secret_hash, subject_pattern FROM api_secrets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to load API secret", e))
    }
}
