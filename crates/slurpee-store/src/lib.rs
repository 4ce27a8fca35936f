//! # Slurpee Store
//!
//! Persistence contract for the broker: events, subscribers, subscriptions
//! and delivery attempts. Every other crate in the workspace
//! talks to persistence exclusively through the [`Store`] trait - nothing
//! upstream of this crate knows it is Postgres.

pub mod migration;
pub mod models;
pub mod repository;

pub use migration::run as run_migrations;
pub use models::*;
pub use repository::{PgStore, Store};
