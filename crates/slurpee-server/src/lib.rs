//! # Slurpee Server
//!
//! The HTTP boundary: router, middleware, request
//! extractors, and the `AppState` they all share. The process entry point
//! lives in `main.rs`, wiring this crate to `slurpee-store`,
//! `slurpee-cache`, `slurpee-events` and `slurpee-dispatch`.

pub mod error;
pub mod extract;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod shutdown;
pub mod state;

pub use state::AppState;
