//! The HTTP router and its handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use slurpee_core::error::Error as CoreError;
use slurpee_core::ids::new_event_id;
use slurpee_events::BusEvent;
use slurpee_store::{Event, NewEvent, Subscriber, SubscriberUpsert};

use crate::error::{HttpError, HttpResult};
use crate::extract::{AdminSecret, PathId, PublisherSecret};
use crate::response::{Created, NoContent};
use crate::state::AppState;

/// Builds the full router, mounted once in `main.rs`.
/// Middleware is layered on by the caller, outside-in, around this router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events", post(ingest_event))
        .route("/api/events/:id", get(get_event))
        .route(
            "/api/subscribers",
            post(upsert_subscriber).get(list_subscribers),
        )
        .route("/api/subscribers/:id", delete(delete_subscriber))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}

/// Body accepted by `POST /api/events`.
#[derive(Debug, Deserialize)]
pub struct IngestEventRequest {
    pub subject: String,
    pub data: JsonValue,
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub trace_id: Option<Uuid>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// `POST /api/events` — validates the publisher's access to the subject,
/// persists the event, and hands it to the dispatcher for delivery.
async fn ingest_event(
    State(state): State<AppState>,
    publisher: PublisherSecret,
    Json(body): Json<IngestEventRequest>,
) -> HttpResult<Created<Event>> {
    if body.subject.trim().is_empty() {
        return Err(HttpError::bad_request("subject is required"));
    }
    if !body.data.is_object() {
        return Err(HttpError::bad_request("data must be a JSON object"));
    }

    publisher.authorizes(&body.subject)?;

    let new_event = NewEvent {
        id: body.id.unwrap_or_else(new_event_id),
        subject: body.subject,
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
        trace_id: body.trace_id,
        data: body.data,
    };

    let event = state.store.insert_event(new_event).await?;

    state.bus.publish(BusEvent::Created {
        event_id: event.id,
        subject: event.subject.clone(),
    });

    state
        .dispatcher
        .ingest(event.clone())
        .await
        .map_err(HttpError::from)?;

    Ok(Created(event))
}

/// `GET /api/events/{id}` — any valid secret may read any event.
async fn get_event(
    State(state): State<AppState>,
    _publisher: PublisherSecret,
    PathId(id): PathId,
) -> HttpResult<Json<Event>> {
    let event = state
        .store
        .get_event(id)
        .await?
        .ok_or_else(|| CoreError::not_found("event", id.to_string()))?;
    Ok(Json(event))
}

/// `POST /api/subscribers` — admin-authenticated upsert.
async fn upsert_subscriber(
    State(state): State<AppState>,
    _admin: AdminSecret,
    Json(upsert): Json<SubscriberUpsert>,
) -> HttpResult<Created<Subscriber>> {
    if upsert.name.trim().is_empty() {
        return Err(HttpError::bad_request("name is required"));
    }
    if upsert.endpoint_url.trim().is_empty() {
        return Err(HttpError::bad_request("endpoint_url is required"));
    }

    let subscriber = state.store.upsert_subscriber(upsert).await?;
    state.cache.flush().await;
    Ok(Created(subscriber))
}

/// `GET /api/subscribers` — admin-authenticated list.
async fn list_subscribers(
    State(state): State<AppState>,
    _admin: AdminSecret,
) -> HttpResult<Json<Vec<Subscriber>>> {
    let subscribers = state.store.list_subscribers().await?;
    Ok(Json(subscribers))
}

/// `DELETE /api/subscribers/{id}` — admin-authenticated delete.
async fn delete_subscriber(
    State(state): State<AppState>,
    _admin: AdminSecret,
    PathId(id): PathId,
) -> HttpResult<NoContent> {
    state.store.delete_subscriber(id).await?;
    state.cache.flush().await;
    Ok(NoContent)
}

/// `GET /healthz` — the process is up, nothing more.
async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

/// `GET /readyz` — 200 iff a `SELECT 1` against the pool succeeds within a
/// short timeout, 503 otherwise.
async fn readyz(State(state): State<AppState>) -> Response {
    let check = tokio::time::timeout(Duration::from_secs(2), state.store.health_check()).await;
    match check {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        Err(_) => {
            tracing::warn!("readiness check timed out");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use slurpee_cache::SubscriptionCache;
    use slurpee_core::config::AppConfig;
    use slurpee_core::error::Result;
    use slurpee_dispatch::Dispatcher;
    use slurpee_events::EventBus;
    use slurpee_store::{
        ApiSecret, DeliveryAttempt, DeliveryStatus, NewDeliveryAttempt, Store,
        SubscriberDeliverySummary, Subscription,
    };
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct FakeStore {
        secret: ApiSecret,
        events: Mutex<Vec<Event>>,
        subscribers: Mutex<Vec<Subscriber>>,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
        async fn insert_event(&self, event: NewEvent) -> Result<Event> {
            let event = Event {
                id: event.id,
                subject: event.subject,
                timestamp: event.timestamp,
                trace_id: event.trace_id,
                data: event.data,
                retry_count: 0,
                delivery_status_raw: "pending".into(),
                status_updated_at: Utc::now(),
            };
            self.events.lock().unwrap().push(event.clone());
            Ok(event)
        }
        async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
            Ok(self.events.lock().unwrap().iter().find(|e| e.id == id).cloned())
        }
        async fn set_event_status(&self, _: Uuid, _: DeliveryStatus, _: Option<i32>) -> Result<()> {
            Ok(())
        }
        async fn resumable_events(&self) -> Result<Vec<Event>> {
            Ok(vec![])
        }
        async fn insert_delivery_attempt(&self, _: NewDeliveryAttempt) -> Result<DeliveryAttempt> {
            unimplemented!()
        }
        async fn delivery_summary(&self, _: Uuid) -> Result<Vec<SubscriberDeliverySummary>> {
            Ok(vec![])
        }
        async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
            Ok(self.subscribers.lock().unwrap().clone())
        }
        async fn get_subscriber(&self, id: Uuid) -> Result<Option<Subscriber>> {
            Ok(self
                .subscribers
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.id == id)
                .cloned())
        }
        async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
            Ok(vec![])
        }
        async fn upsert_subscriber(&self, upsert: SubscriberUpsert) -> Result<Subscriber> {
            let subscriber = Subscriber {
                id: Uuid::now_v7(),
                name: upsert.name,
                endpoint_url: upsert.endpoint_url,
                auth_secret: upsert.auth_secret,
                max_parallel: upsert.max_parallel.unwrap_or(4),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.subscribers.lock().unwrap().push(subscriber.clone());
            Ok(subscriber)
        }
        async fn delete_subscriber(&self, id: Uuid) -> Result<()> {
            self.subscribers.lock().unwrap().retain(|s| s.id != id);
            Ok(())
        }
        async fn get_api_secret(&self, id: Uuid) -> Result<Option<ApiSecret>> {
            if id == self.secret.id {
                Ok(Some(ApiSecret {
                    id: self.secret.id,
                    name: self.secret.name.clone(),
                    secret_hash: self.secret.secret_hash.clone(),
                    subject_pattern: self.secret.subject_pattern.clone(),
                }))
            } else {
                Ok(None)
            }
        }
    }

    fn test_state(secret_id: Uuid, subject_pattern: &str) -> AppState {
        let secret_hash = slurpee_auth::secret::hash_secret("plaintext-secret").unwrap();
        let store: Arc<dyn Store> = Arc::new(FakeStore {
            secret: ApiSecret {
                id: secret_id,
                name: "publisher".into(),
                secret_hash,
                subject_pattern: subject_pattern.into(),
            },
            events: Mutex::new(vec![]),
            subscribers: Mutex::new(vec![]),
        });
        let cache = Arc::new(SubscriptionCache::new(store.clone()));
        let bus = EventBus::new();
        let config = Arc::new(AppConfig::default());
        let (dispatcher, _handles) =
            Dispatcher::start(store.clone(), cache.clone(), bus.clone(), config.delivery.clone());
        AppState::new(config, store, cache, bus, dispatcher)
    }

    fn app(state: AppState) -> Router {
        router().with_state(state)
    }

    #[tokio::test]
    async fn ingest_with_valid_secret_returns_201_and_the_stored_event() {
        let secret_id = Uuid::now_v7();
        let state = test_state(secret_id, "order.*");
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/events")
                    .header("content-type", "application/json")
                    .header("x-slurpee-secret-id", secret_id.to_string())
                    .header("x-slurpee-secret", "plaintext-secret")
                    .body(Body::from(
                        serde_json::json!({"subject": "order.created", "data": {"x": 1}})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let event: Event = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(event.subject, "order.created");
    }

    #[tokio::test]
    async fn ingest_with_wrong_secret_returns_401() {
        let secret_id = Uuid::now_v7();
        let state = test_state(secret_id, "order.*");
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/events")
                    .header("content-type", "application/json")
                    .header("x-slurpee-secret-id", secret_id.to_string())
                    .header("x-slurpee-secret", "wrong-secret")
                    .body(Body::from(
                        serde_json::json!({"subject": "order.created", "data": {}}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ingest_out_of_scope_subject_returns_403() {
        let secret_id = Uuid::now_v7();
        let state = test_state(secret_id, "order.*");
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/events")
                    .header("content-type", "application/json")
                    .header("x-slurpee-secret-id", secret_id.to_string())
                    .header("x-slurpee-secret", "plaintext-secret")
                    .body(Body::from(
                        serde_json::json!({"subject": "invoice.created", "data": {}}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn ingest_with_non_object_data_returns_400() {
        let secret_id = Uuid::now_v7();
        let state = test_state(secret_id, "order.*");
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/events")
                    .header("content-type", "application/json")
                    .header("x-slurpee-secret-id", secret_id.to_string())
                    .header("x-slurpee-secret", "plaintext-secret")
                    .body(Body::from(
                        serde_json::json!({"subject": "order.created", "data": [1, 2]})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_unknown_event_returns_404() {
        let secret_id = Uuid::now_v7();
        let state = test_state(secret_id, "order.*");
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/events/{}", Uuid::now_v7()))
                    .header("x-slurpee-secret-id", secret_id.to_string())
                    .header("x-slurpee-secret", "plaintext-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn subscriber_admin_requires_the_admin_secret() {
        let secret_id = Uuid::now_v7();
        let state = test_state(secret_id, "order.*");
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/subscribers")
                    .header("x-slurpee-admin-secret", "wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn subscriber_upsert_and_list_round_trip() {
        let secret_id = Uuid::now_v7();
        let state = test_state(secret_id, "order.*");
        let admin_secret = state.config.server.admin_secret.clone();
        let app = app(state);

        let upsert_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/subscribers")
                    .header("content-type", "application/json")
                    .header("x-slurpee-admin-secret", admin_secret.clone())
                    .body(Body::from(
                        serde_json::json!({
                            "name": "billing",
                            "endpoint_url": "https://billing.example.test/hook",
                            "auth_secret": "s3cr3t",
                            "subscriptions": [{"subject_pattern": "order.*"}]
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(upsert_response.status(), StatusCode::CREATED);

        let list_response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/subscribers")
                    .header("x-slurpee-admin-secret", admin_secret)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(list_response.status(), StatusCode::OK);
        let bytes = to_bytes(list_response.into_body(), usize::MAX).await.unwrap();
        let subscribers: Vec<Subscriber> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(subscribers.len(), 1);
        assert_eq!(subscribers[0].name, "billing");
    }

    #[tokio::test]
    async fn healthz_always_returns_200() {
        let secret_id = Uuid::now_v7();
        let state = test_state(secret_id, "order.*");
        let app = app(state);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_returns_200_when_the_store_is_reachable() {
        let secret_id = Uuid::now_v7();
        let state = test_state(secret_id, "order.*");
        let app = app(state);

        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
