//! # Slurpee Cache
//!
//! The in-memory subscription cache: a lazily bulk-loaded,
//! flush-invalidated view of every subscriber and subscription, plus the
//! pure subject-pattern and filter matchers it's built on.

pub mod filter;
pub mod pattern;
pub mod subscription_cache;

pub use subscription_cache::SubscriptionCache;
