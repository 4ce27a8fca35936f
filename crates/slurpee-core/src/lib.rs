//! # Slurpee Core
//!
//! Shared types, configuration and error handling for the Slurpee durable
//! event broker. Every other crate in the workspace depends on this one;
//! it carries no dependency on persistence, HTTP, or delivery logic.

pub mod config;
pub mod error;
pub mod ids;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use ids::new_event_id;

/// The current version of Slurpee.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
