//! # Slurpee Events
//!
//! The process-local event bus that fans broker activity out to
//! SSE subscribers. Non-blocking, in-memory, never persisted.

pub mod bus;
pub mod message;

pub use bus::{EventBus, Unsubscribe};
pub use message::{BusEvent, BusMessage};
