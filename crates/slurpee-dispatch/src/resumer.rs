//! Startup resume: re-queues events the broker was mid-delivery on when it
//! last stopped.

use std::sync::Arc;

use tracing::{info, warn};

use slurpee_store::DeliveryStatus;

use crate::dispatcher::Dispatcher;

/// Loads every `pending`/`partial` event and re-queues it. `pending` events
/// never got as far as creating a tracker, so they go back through the
/// ordinary ingest path and are dispatched fresh. `partial` events already
/// have delivery history, so their in-flight state is rebuilt from the
/// persisted attempt counts instead of starting over.
///
/// Runs once, synchronously, before the HTTP listener starts accepting
/// traffic - unresolved events should start moving
/// again before new ones arrive, not race with them.
pub async fn resume(dispatcher: &Arc<Dispatcher>) {
    let events = match dispatcher.store().resumable_events().await {
        Ok(events) => events,
        Err(err) => {
            warn!(error = %err, "failed to load resumable events, starting with none");
            return;
        }
    };

    if events.is_empty() {
        info!("no resumable events found");
        return;
    }

    info!(count = events.len(), "resuming events from a prior run");

    for event in events {
        match event.delivery_status() {
            DeliveryStatus::Pending => {
                if let Err(err) = dispatcher.ingest(event.clone()).await {
                    warn!(event_id = %event.id, error = %err, "failed to re-ingest pending event");
                }
            }
            DeliveryStatus::Partial => {
                let summary = match dispatcher.store().delivery_summary(event.id).await {
                    Ok(summary) => summary,
                    Err(err) => {
                        warn!(event_id = %event.id, error = %err, "failed to load delivery summary, skipping resume for this event");
                        continue;
                    }
                };
                dispatcher.resume_partial_event(event, &summary).await;
            }
            other => {
                warn!(event_id = %event.id, status = %other, "resumable_events returned an unexpected status, skipping");
            }
        }
    }
}
