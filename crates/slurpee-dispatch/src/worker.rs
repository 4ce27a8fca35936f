//! Delivery worker loop: pulls tasks off the shared queue, makes the HTTP
//! call, persists the attempt, and either finalizes the subscription's
//! result or arms a retry timer.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use slurpee_store::{AttemptStatus, NewDeliveryAttempt};

use crate::dispatcher::Dispatcher;
use crate::http;
use crate::retry;
use crate::task::DeliveryTask;
use crate::tracker::SubscriptionResult;

pub(crate) type TaskReceiver = tokio::sync::Mutex<tokio::sync::mpsc::Receiver<DeliveryTask>>;

pub async fn run(dispatcher: Arc<Dispatcher>, task_rx: Arc<TaskReceiver>, worker_id: usize) {
    debug!(worker_id, "delivery worker starting");
    loop {
        let task = {
            let mut guard = task_rx.lock().await;
            guard.recv().await
        };
        let Some(task) = task else {
            break;
        };
        process_task(&dispatcher, task).await;
    }
    debug!(worker_id, "delivery worker exiting, task queue closed and drained");
}

async fn process_task(dispatcher: &Arc<Dispatcher>, task: DeliveryTask) {
    let subscriber = match dispatcher.cache().subscriber_by_id(task.subscriber_id).await {
        Ok(Some(subscriber)) => subscriber,
        Ok(None) => {
            warn!(
                event_id = %task.event.id,
                subscriber_id = %task.subscriber_id,
                "subscriber no longer exists, abandoning task"
            );
            finish(dispatcher, &task, SubscriptionResult::exhausted()).await;
            return;
        }
        Err(err) => {
            warn!(event_id = %task.event.id, error = %err, "failed to resolve subscriber, abandoning task");
            finish(dispatcher, &task, SubscriptionResult::exhausted()).await;
            return;
        }
    };

    let semaphore = dispatcher
        .semaphore_for(task.subscriber_id, subscriber.max_parallel.max(1) as u32)
        .await;
    let permit = semaphore
        .acquire_owned()
        .await
        .expect("subscriber semaphores are never closed");

    let outcome = http::deliver(
        &dispatcher.http_client,
        &subscriber,
        task.event.id,
        &task.event.subject,
        &task.event.data,
        dispatcher.config.request_timeout(),
        dispatcher.config.max_response_body_bytes,
    )
    .await;

    // The HTTP call is the only thing the semaphore guards; release it
    // before touching persistence or the bus so slow storage never steals
    // a subscriber's concurrency budget.
    drop(permit);

    dispatcher.bus().publish(slurpee_events::BusEvent::DeliveryAttempt {
        event_id: task.event.id,
        subscriber_id: task.subscriber_id,
        status: outcome.status.as_str().to_string(),
        response_status_code: outcome.response_status_code,
    });

    let attempt = NewDeliveryAttempt {
        event_id: task.event.id,
        subscriber_id: task.subscriber_id,
        endpoint_url: subscriber.endpoint_url.clone(),
        attempted_at: Utc::now(),
        request_headers: outcome.request_headers.clone(),
        response_status_code: outcome.response_status_code,
        response_headers: outcome.response_headers.clone(),
        response_body: outcome.response_body.clone(),
        status: outcome.status,
    };
    if let Err(err) = dispatcher.store().insert_delivery_attempt(attempt).await {
        warn!(
            event_id = %task.event.id,
            subscriber_id = %task.subscriber_id,
            error = %err,
            "failed to persist delivery attempt, continuing (bookkeeping only)"
        );
    }

    match outcome.status {
        AttemptStatus::Succeeded => {
            debug!(event_id = %task.event.id, subscriber_id = %task.subscriber_id, attempt = task.attempt_num, "delivery succeeded");
            finish(dispatcher, &task, SubscriptionResult::succeeded()).await;
        }
        AttemptStatus::Failed if task.attempt_num >= task.max_retries => {
            debug!(event_id = %task.event.id, subscriber_id = %task.subscriber_id, "retry budget exhausted");
            finish(dispatcher, &task, SubscriptionResult::exhausted()).await;
        }
        AttemptStatus::Failed => {
            schedule_retry(dispatcher, task).await;
        }
    }
}

/// Records a terminal outcome for this (event, subscription) and finalizes
/// the event if every expected outcome is now in, then releases the
/// in-flight slot this task held.
async fn finish(dispatcher: &Arc<Dispatcher>, task: &DeliveryTask, result: SubscriptionResult) {
    if let Some(tracker) = dispatcher.registry().get(task.event.id) {
        if tracker.record(task.subscription_id, result).await {
            dispatcher.finalize_event(task.event.id).await;
        }
    }
    dispatcher.inflight().decrement();
}

/// Arms a retry timer for `task`, bumping the event's status to `partial`
/// in the meantime. The in-flight slot the failed
/// attempt held is hung over to the timer so shutdown still waits for it.
async fn schedule_retry(dispatcher: &Arc<Dispatcher>, task: DeliveryTask) {
    let delay = retry::backoff_delay(task.attempt_num, dispatcher.config.max_backoff_seconds);
    debug!(
        event_id = %task.event.id,
        subscriber_id = %task.subscriber_id,
        attempt = task.attempt_num,
        delay_secs = delay.as_secs(),
        "scheduling retry"
    );

    if let Err(err) = dispatcher
        .store()
        .set_event_status(
            task.event.id,
            slurpee_store::DeliveryStatus::Partial,
            Some(task.attempt_num as i32 + 1),
        )
        .await
    {
        warn!(event_id = %task.event.id, error = %err, "failed to persist partial status (bookkeeping only)");
    }

    if dispatcher.is_cancelled() {
        debug!(event_id = %task.event.id, "shutdown already in progress, abandoning retry instead of arming timer");
        dispatcher.inflight().decrement();
        return;
    }

    // The in-flight slot this failed attempt held is handed over to the
    // timer as-is - no net change to the count, just a change of what it
    // represents - until the timer either requeues a successor task (which
    // gets its own fresh slot) or is cancelled by shutdown.
    let dispatcher = dispatcher.clone();
    let mut cancel_rx = dispatcher.subscribe_cancellation();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let successor = DeliveryTask {
                    attempt_num: task.attempt_num + 1,
                    ..task
                };
                dispatcher.inflight().increment();
                dispatcher.enqueue_task(successor).await;
                dispatcher.inflight().decrement();
            }
            _ = cancel_rx.changed() => {
                debug!(event_id = %task.event.id, "retry timer cancelled by shutdown");
                dispatcher.inflight().decrement();
            }
        }
    });
}
