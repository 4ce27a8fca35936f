//! Application state shared across all requests.

use std::sync::Arc;

use slurpee_cache::SubscriptionCache;
use slurpee_core::config::AppConfig;
use slurpee_dispatch::Dispatcher;
use slurpee_events::EventBus;
use slurpee_store::Store;

/// Everything a handler needs, cheap to clone (every field is an `Arc` or
/// already internally `Arc`-backed).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub cache: Arc<SubscriptionCache>,
    pub bus: EventBus,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn Store>,
        cache: Arc<SubscriptionCache>,
        bus: EventBus,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            bus,
            dispatcher,
        }
    }
}
