//! # Slurpee Dispatch
//!
//! The delivery engine: fans an ingested event out into
//! per-subscriber delivery tasks, runs a bounded worker pool against
//! subscriber webhooks with per-subscriber concurrency caps and exponential
//! backoff, tracks each event to a terminal status, and resumes
//! in-progress events on startup.

pub mod dispatcher;
pub mod http;
pub mod inflight;
pub mod resumer;
pub mod retry;
pub mod semaphore;
pub mod task;
pub mod tracker;
mod worker;

pub use dispatcher::{Dispatcher, DispatcherHandles};
pub use inflight::InFlight;
pub use resumer::resume;
pub use task::DeliveryTask;
pub use tracker::{EventTracker, SubscriptionResult, TrackerRegistry};
