//! The unit of work the worker pool consumes.

use uuid::Uuid;

use slurpee_store::Event;

/// One scheduled HTTP attempt against one subscriber for one event.
///
/// A task is produced at most once per (event, subscriber) by
/// `dispatch_event`'s dedup rule, then re-enqueued with an incremented
/// `attempt_num` by the worker itself on a retryable failure - never by the
/// dispatcher.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    pub event: Event,
    pub subscriber_id: Uuid,
    pub subscription_id: Uuid,
    /// Effective max retries for this (event, subscription) pair, resolved
    /// once at task-creation time so every retry of the task agrees on the
    /// budget even if the subscription is later edited.
    pub max_retries: u32,
    /// 0-based; the first HTTP attempt for this task is attempt 0.
    pub attempt_num: u32,
}
