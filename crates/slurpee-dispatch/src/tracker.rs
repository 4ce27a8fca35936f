//! Per-event completion tracker.
//!
//! Exactly-once finalization without a collector task: every worker that
//! finishes a subscription-level outcome calls `record`, which returns
//! `true` to exactly one caller - the one whose write brings the result
//! count up to `expected`. Only that caller finalizes the event.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use slurpee_store::DeliveryStatus;

/// The terminal outcome of one subscription's delivery attempts for an
/// event: either it eventually succeeded, or it exhausted its retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionResult {
    pub succeeded: bool,
    pub exhausted: bool,
}

impl SubscriptionResult {
    pub fn succeeded() -> Self {
        Self {
            succeeded: true,
            exhausted: false,
        }
    }

    pub fn exhausted() -> Self {
        Self {
            succeeded: false,
            exhausted: true,
        }
    }
}

/// Collector for one event's subscription-level outcomes.
///
/// The data structure allows a subscription id to be written more than once
/// (last-write-wins); in practice each worker records exactly one terminal
/// result per task, so this is effectively write-once, but the map does not
/// assert that.
pub struct EventTracker {
    expected: usize,
    results: Mutex<HashMap<Uuid, SubscriptionResult>>,
}

impl EventTracker {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            results: Mutex::new(HashMap::with_capacity(expected)),
        }
    }

    /// Record one subscription's outcome. Returns `true` iff this call
    /// brought the number of recorded outcomes up to `expected` - the
    /// signal that the caller, and only the caller, should finalize.
    pub async fn record(&self, subscription_id: Uuid, result: SubscriptionResult) -> bool {
        let mut guard = self.results.lock().await;
        guard.insert(subscription_id, result);
        guard.len() == self.expected
    }

    /// Snapshot of every outcome recorded so far, used to compute the final
    /// event status once `record` signals completion.
    pub async fn snapshot(&self) -> Vec<SubscriptionResult> {
        self.results.lock().await.values().copied().collect()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }
}

/// Map from event id to its in-flight tracker. Entries are removed once the
/// event finalizes.
#[derive(Default)]
pub struct TrackerRegistry {
    trackers: DashMap<Uuid, Arc<EventTracker>>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self {
            trackers: DashMap::new(),
        }
    }

    pub fn register(&self, event_id: Uuid, expected: usize) -> Arc<EventTracker> {
        let tracker = Arc::new(EventTracker::new(expected));
        self.trackers.insert(event_id, tracker.clone());
        tracker
    }

    pub fn get(&self, event_id: Uuid) -> Option<Arc<EventTracker>> {
        self.trackers.get(&event_id).map(|t| t.clone())
    }

    pub fn remove(&self, event_id: Uuid) {
        self.trackers.remove(&event_id);
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }
}

/// Final event status from a completed set of subscription outcomes (spec
/// §4.5). A degenerate empty set (no expected results, which dispatch_event
/// never actually produces - it short-circuits to `recorded`/`failed`
/// before creating a tracker) maps to `failed` rather than panicking.
pub fn finalize_status(results: &[SubscriptionResult]) -> DeliveryStatus {
    let all_succeeded = !results.is_empty() && results.iter().all(|r| r.succeeded);
    if all_succeeded {
        return DeliveryStatus::Delivered;
    }
    DeliveryStatus::Failed
}
