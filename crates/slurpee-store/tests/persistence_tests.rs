//! Integration tests against a real Postgres instance, migrated fresh per
//! test by `#[sqlx::test]`. Requires `DATABASE_URL` to point at a server
//! the test runner is allowed to create throwaway databases on.

use serde_json::json;
use uuid::Uuid;

use slurpee_store::models::{
    AttemptStatus, DeliveryStatus, NewDeliveryAttempt, NewEvent, SubscriberUpsert,
    SubscriptionUpsert,
};
use slurpee_store::{PgStore, Store};

fn sample_event(subject: &str) -> NewEvent {
    NewEvent {
        id: Uuid::now_v7(),
        subject: subject.to_string(),
        timestamp: chrono::Utc::now(),
        trace_id: None,
        data: json!({"amount": 99.99}),
    }
}

#[sqlx::test]
async fn insert_and_load_round_trips_an_event(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let inserted = store
        .insert_event(sample_event("order.created"))
        .await
        .unwrap();

    assert_eq!(inserted.delivery_status(), DeliveryStatus::Pending);
    assert_eq!(inserted.retry_count, 0);

    let loaded = store.get_event(inserted.id).await.unwrap().unwrap();
    assert_eq!(loaded.subject, "order.created");
    assert_eq!(loaded.data, json!({"amount": 99.99}));
}

#[sqlx::test]
async fn get_event_returns_none_for_unknown_id(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    assert!(store.get_event(Uuid::now_v7()).await.unwrap().is_none());
}

#[sqlx::test]
async fn set_event_status_bumps_retry_count_and_updates_terminal_state(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let event = store.insert_event(sample_event("order.created")).await.unwrap();

    store
        .set_event_status(event.id, DeliveryStatus::Partial, Some(1))
        .await
        .unwrap();
    let reloaded = store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(reloaded.delivery_status(), DeliveryStatus::Partial);
    assert_eq!(reloaded.retry_count, 1);

    store
        .set_event_status(event.id, DeliveryStatus::Delivered, None)
        .await
        .unwrap();
    let reloaded = store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(reloaded.delivery_status(), DeliveryStatus::Delivered);
    assert_eq!(reloaded.retry_count, 1, "retry_count is untouched when not passed");
}

#[sqlx::test]
async fn resumable_events_only_returns_pending_and_partial(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let pending = store.insert_event(sample_event("a")).await.unwrap();
    let partial = store.insert_event(sample_event("b")).await.unwrap();
    let delivered = store.insert_event(sample_event("c")).await.unwrap();
    let failed = store.insert_event(sample_event("d")).await.unwrap();

    store
        .set_event_status(partial.id, DeliveryStatus::Partial, Some(1))
        .await
        .unwrap();
    store
        .set_event_status(delivered.id, DeliveryStatus::Delivered, None)
        .await
        .unwrap();
    store
        .set_event_status(failed.id, DeliveryStatus::Failed, None)
        .await
        .unwrap();

    let resumable: Vec<Uuid> = store
        .resumable_events()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();

    assert!(resumable.contains(&pending.id));
    assert!(resumable.contains(&partial.id));
    assert!(!resumable.contains(&delivered.id));
    assert!(!resumable.contains(&failed.id));
}

#[sqlx::test]
async fn delivery_summary_counts_succeeded_and_failed_per_subscriber(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let event = store.insert_event(sample_event("order.created")).await.unwrap();
    let subscriber = store
        .upsert_subscriber(SubscriberUpsert {
            name: "A".into(),
            endpoint_url: "https://a.example/hook".into(),
            auth_secret: "s".into(),
            max_parallel: None,
            subscriptions: vec![SubscriptionUpsert {
                subject_pattern: "order.*".into(),
                filter: None,
                max_retries: None,
            }],
        })
        .await
        .unwrap();

    for status in [AttemptStatus::Failed, AttemptStatus::Failed, AttemptStatus::Succeeded] {
        store
            .insert_delivery_attempt(NewDeliveryAttempt {
                event_id: event.id,
                subscriber_id: subscriber.id,
                endpoint_url: subscriber.endpoint_url.clone(),
                attempted_at: chrono::Utc::now(),
                request_headers: json!({}),
                response_status_code: Some(if status == AttemptStatus::Succeeded { 200 } else { 500 }),
                response_headers: json!({}),
                response_body: String::new(),
                status,
            })
            .await
            .unwrap();
    }

    let summary = store.delivery_summary(event.id).await.unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].subscriber_id, subscriber.id);
    assert_eq!(summary[0].succeeded_count, 1);
    assert_eq!(summary[0].failed_count, 2);
}

#[sqlx::test]
async fn upsert_subscriber_syncs_subscriptions(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);

    let subscriber = store
        .upsert_subscriber(SubscriberUpsert {
            name: "A".into(),
            endpoint_url: "https://a.example/hook".into(),
            auth_secret: "s1".into(),
            max_parallel: Some(2),
            subscriptions: vec![
                SubscriptionUpsert {
                    subject_pattern: "order.*".into(),
                    filter: None,
                    max_retries: Some(3),
                },
                SubscriptionUpsert {
                    subject_pattern: "refund.*".into(),
                    filter: None,
                    max_retries: None,
                },
            ],
        })
        .await
        .unwrap();

    // Re-upsert with one pattern dropped, one changed, one added.
    store
        .upsert_subscriber(SubscriberUpsert {
            name: "A renamed".into(),
            endpoint_url: "https://a.example/hook".into(),
            auth_secret: "s2".into(),
            max_parallel: Some(8),
            subscriptions: vec![
                SubscriptionUpsert {
                    subject_pattern: "order.*".into(),
                    filter: None,
                    max_retries: Some(7),
                },
                SubscriptionUpsert {
                    subject_pattern: "invoice.*".into(),
                    filter: None,
                    max_retries: None,
                },
            ],
        })
        .await
        .unwrap();

    let reloaded = store.get_subscriber(subscriber.id).await.unwrap().unwrap();
    assert_eq!(reloaded.name, "A renamed");
    assert_eq!(reloaded.max_parallel, 8);
    assert_eq!(reloaded.auth_secret, "s2");

    let subs = store.list_subscriptions().await.unwrap();
    let patterns: Vec<&str> = subs
        .iter()
        .filter(|s| s.subscriber_id == subscriber.id)
        .map(|s| s.subject_pattern.as_str())
        .collect();

    assert_eq!(patterns.len(), 2, "refund.* should have been pruned");
    assert!(patterns.contains(&"order.*"));
    assert!(patterns.contains(&"invoice.*"));
    let order_sub = subs
        .iter()
        .find(|s| s.subscriber_id == subscriber.id && s.subject_pattern == "order.*")
        .unwrap();
    assert_eq!(order_sub.max_retries, Some(7));
}

#[sqlx::test]
async fn delete_subscriber_cascades_subscriptions(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let subscriber = store
        .upsert_subscriber(SubscriberUpsert {
            name: "A".into(),
            endpoint_url: "https://a.example/hook".into(),
            auth_secret: "s".into(),
            max_parallel: None,
            subscriptions: vec![SubscriptionUpsert {
                subject_pattern: "order.*".into(),
                filter: None,
                max_retries: None,
            }],
        })
        .await
        .unwrap();

    store.delete_subscriber(subscriber.id).await.unwrap();

    assert!(store.get_subscriber(subscriber.id).await.unwrap().is_none());
    let subs = store.list_subscriptions().await.unwrap();
    assert!(subs.iter().all(|s| s.subscriber_id != subscriber.id));
}
