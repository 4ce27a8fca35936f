//! The dispatcher: owns the worker pool, per-subscriber semaphores, task
//! queue and event-tracker registry, and fans events out into tasks (spec
//! §4.3).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use slurpee_cache::SubscriptionCache;
use slurpee_core::config::DeliveryConfig;
use slurpee_core::error::{Error, Result};
use slurpee_events::{BusEvent, EventBus};
use slurpee_store::{DeliveryStatus, Event, Store, Subscription, SubscriberDeliverySummary};

use crate::inflight::InFlight;
use crate::retry;
use crate::semaphore::SemaphoreRegistry;
use crate::task::DeliveryTask;
use crate::tracker::{finalize_status, SubscriptionResult, TrackerRegistry};
use crate::worker;

/// Shared engine state plus the channel endpoints every other part of the
/// pipeline talks to. Cheap to clone (it's all `Arc`s internally via the
/// fields it owns).
pub struct Dispatcher {
    store: Arc<dyn Store>,
    cache: Arc<SubscriptionCache>,
    bus: EventBus,
    pub(crate) config: DeliveryConfig,
    pub(crate) http_client: reqwest::Client,
    semaphores: SemaphoreRegistry,
    registry: TrackerRegistry,
    inflight: InFlight,
    ingest_tx: Mutex<Option<mpsc::Sender<Event>>>,
    task_tx: Mutex<Option<mpsc::Sender<DeliveryTask>>>,
    cancelled: watch::Sender<bool>,
}

/// Join handles for the background tasks `Dispatcher::start` spawned, kept
/// by the caller so shutdown can wait for them to drain.
pub struct DispatcherHandles {
    pub ingester: tokio::task::JoinHandle<()>,
    pub workers: Vec<tokio::task::JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns the ingester routine and the fixed worker pool, returning the
    /// shared dispatcher plus their join handles.
    pub fn start(
        store: Arc<dyn Store>,
        cache: Arc<SubscriptionCache>,
        bus: EventBus,
        config: DeliveryConfig,
    ) -> (Arc<Dispatcher>, DispatcherHandles) {
        let (ingest_tx, mut ingest_rx) = mpsc::channel::<Event>(config.delivery_chan_size);
        let (task_tx, task_rx) = mpsc::channel::<DeliveryTask>(config.delivery_queue_size);
        let task_rx = Arc::new(Mutex::new(task_rx));

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_default();

        let (cancelled, _) = watch::channel(false);

        let dispatcher = Arc::new(Dispatcher {
            store,
            cache,
            bus,
            config,
            http_client,
            semaphores: SemaphoreRegistry::new(),
            registry: TrackerRegistry::new(),
            inflight: InFlight::new(),
            ingest_tx: Mutex::new(Some(ingest_tx)),
            task_tx: Mutex::new(Some(task_tx)),
            cancelled,
        });

        let ingester_dispatcher = dispatcher.clone();
        let ingester = tokio::spawn(async move {
            while let Some(event) = ingest_rx.recv().await {
                ingester_dispatcher.dispatch_event(event).await;
            }
            debug!("ingest channel closed and drained, ingester exiting");
        });

        let mut workers = Vec::with_capacity(dispatcher.config.delivery_workers);
        for worker_id in 0..dispatcher.config.delivery_workers {
            let dispatcher = dispatcher.clone();
            let task_rx = task_rx.clone();
            workers.push(tokio::spawn(async move {
                worker::run(dispatcher, task_rx, worker_id).await;
            }));
        }

        (dispatcher, DispatcherHandles { ingester, workers })
    }

    /// Hands an event to the dispatcher via the ingest channel. Blocks if
    /// the channel is full - the intended backpressure point. Fails with
    /// `ShutdownInProgress` once the channel has been closed for shutdown.
    pub async fn ingest(&self, event: Event) -> Result<()> {
        let tx = {
            let guard = self.ingest_tx.lock().await;
            guard.clone()
        };
        match tx {
            Some(tx) => tx
                .send(event)
                .await
                .map_err(|_| Error::ShutdownInProgress),
            None => Err(Error::ShutdownInProgress),
        }
    }

    /// Enqueues a task directly onto the task queue, bypassing the ingest
    /// channel - used by the resumer so it never races with
    /// ingest-channel shutdown.
    pub async fn enqueue_task(&self, task: DeliveryTask) {
        let tx = {
            let guard = self.task_tx.lock().await;
            guard.clone()
        };
        match tx {
            Some(tx) => {
                if tx.send(task).await.is_err() {
                    warn!("task queue closed while enqueueing, dropping task");
                    self.inflight.decrement();
                }
            }
            None => {
                warn!("task queue already closed, dropping task");
                self.inflight.decrement();
            }
        }
    }

    /// Looks up matching subscriptions, filters and dedups them, fans the
    /// event out into one delivery task per surviving subscriber, and
    /// finalizes immediately if nothing ends up in flight.
    pub async fn dispatch_event(&self, event: Event) {
        let matches = match self.cache.matching_subscriptions(&event.subject).await {
            Ok(m) => m,
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "failed to resolve subscriptions, leaving event pending");
                return;
            }
        };

        if matches.is_empty() {
            self.finalize_with_status(&event, DeliveryStatus::Recorded)
                .await;
            return;
        }

        let by_subscriber = self.select_one_subscription_per_subscriber(matches, &event).await;

        if by_subscriber.is_empty() {
            // Subjects matched but every candidate's filter rejected the
            // event. We mark this `failed` rather than `recorded`: every
            // candidate was considered and rejected, which is a terminal
            // outcome rather than "nobody was listening".
            self.finalize_with_status(&event, DeliveryStatus::Failed)
                .await;
            return;
        }

        let tracker = self.registry.register(event.id, by_subscriber.len());
        debug!(event_id = %event.id, tasks = by_subscriber.len(), "dispatching event");

        for (subscriber_id, (subscription_id, max_retries)) in by_subscriber {
            let task = DeliveryTask {
                event: event.clone(),
                subscriber_id,
                subscription_id,
                max_retries,
                attempt_num: 0,
            };
            self.inflight.increment();
            self.enqueue_task(task).await;
        }

        let _ = tracker;
    }

    /// Resolves matching subscriptions, applies the filter predicate, and
    /// dedups per subscriber by keeping the match with the highest
    /// effective `max_retries`.
    async fn select_one_subscription_per_subscriber(
        &self,
        matches: Vec<Subscription>,
        event: &Event,
    ) -> HashMap<Uuid, (Uuid, u32)> {
        let mut chosen: HashMap<Uuid, (Uuid, u32)> = HashMap::new();

        for subscription in matches {
            if !slurpee_cache::filter::matches(subscription.filter.as_ref(), &event.data) {
                continue;
            }
            let effective = retry::effective_max_retries(subscription.max_retries, self.config.max_retries);

            chosen
                .entry(subscription.subscriber_id)
                .and_modify(|(_, best)| {
                    if effective > *best {
                        *best = effective;
                    }
                })
                .or_insert((subscription.id, effective));
        }

        chosen
    }

    /// Rebuilds in-flight state for one `partial` event on startup (spec
    /// §4.6). Re-resolves the subscriber set exactly as `dispatch_event`
    /// would, but skips re-delivering to subscribers `summary` already
    /// shows a success for, and resumes the rest at the attempt number
    /// their persisted failure count implies rather than starting over at
    /// zero.
    pub async fn resume_partial_event(&self, event: Event, summary: &[SubscriberDeliverySummary]) {
        let matches = match self.cache.matching_subscriptions(&event.subject).await {
            Ok(m) => m,
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "failed to resolve subscriptions while resuming, leaving event partial");
                return;
            }
        };

        let by_subscriber = self.select_one_subscription_per_subscriber(matches, &event).await;
        if by_subscriber.is_empty() {
            self.finalize_with_status(&event, DeliveryStatus::Failed).await;
            return;
        }

        let tracker = self.registry.register(event.id, by_subscriber.len());
        info!(event_id = %event.id, subscriptions = by_subscriber.len(), "resuming partial event");

        for (subscriber_id, (subscription_id, max_retries)) in by_subscriber {
            let counts = summary.iter().find(|s| s.subscriber_id == subscriber_id);
            let already_succeeded = counts.map(|c| c.succeeded_count > 0).unwrap_or(false);

            if already_succeeded {
                if tracker.record(subscription_id, SubscriptionResult::succeeded()).await {
                    self.finalize_event(event.id).await;
                }
                continue;
            }

            let failed_count = counts.map(|c| c.failed_count).unwrap_or(0).max(0) as u32;
            if failed_count > max_retries {
                if tracker.record(subscription_id, SubscriptionResult::exhausted()).await {
                    self.finalize_event(event.id).await;
                }
                continue;
            }

            let task = DeliveryTask {
                event: event.clone(),
                subscriber_id,
                subscription_id,
                max_retries,
                attempt_num: failed_count,
            };
            self.inflight.increment();
            self.enqueue_task(task).await;
        }
    }

    /// Writes a terminal status directly (no tracker involved) for the
    /// zero-tasks cases of `dispatch_event`.
    async fn finalize_with_status(&self, event: &Event, status: DeliveryStatus) {
        if let Err(err) = self.store.set_event_status(event.id, status, None).await {
            warn!(event_id = %event.id, error = %err, "failed to persist event status (bookkeeping only, continuing)");
        }
        self.bus.publish(BusEvent::StatusChanged {
            event_id: event.id,
            status: status.as_str().to_string(),
        });
    }

    /// Called by a worker once `tracker.record` reports every expected
    /// result is in.
    pub async fn finalize_event(&self, event_id: Uuid) {
        let Some(tracker) = self.registry.get(event_id) else {
            return;
        };
        let results = tracker.snapshot().await;
        let status = finalize_status(&results);

        if let Err(err) = self.store.set_event_status(event_id, status, None).await {
            warn!(event_id = %event_id, error = %err, "failed to persist final event status (bookkeeping only)");
        }
        self.bus.publish(BusEvent::StatusChanged {
            event_id,
            status: status.as_str().to_string(),
        });
        self.registry.remove(event_id);
        debug!(event_id = %event_id, status = %status, "event finalized");
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<SubscriptionCache> {
        &self.cache
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &TrackerRegistry {
        &self.registry
    }

    pub fn inflight(&self) -> &InFlight {
        &self.inflight
    }

    pub(crate) async fn semaphore_for(&self, subscriber_id: Uuid, max_parallel: u32) -> Arc<tokio::sync::Semaphore> {
        self.semaphores.get(subscriber_id, max_parallel).await
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    pub(crate) fn subscribe_cancellation(&self) -> watch::Receiver<bool> {
        self.cancelled.subscribe()
    }

    /// Trips the shutdown signal that pending retry timers watch for, so
    /// they fire immediately instead of waiting out their backoff.
    pub fn cancel_retry_timers(&self) {
        info!("cancelling pending retry timers");
        let _ = self.cancelled.send(true);
    }

    /// Closes the ingest channel so the ingester drains and exits.
    pub async fn close_ingest(&self) {
        self.ingest_tx.lock().await.take();
    }

    /// Closes the task queue so workers drain and exit.
    pub async fn close_task_queue(&self) {
        self.task_tx.lock().await.take();
    }
}
