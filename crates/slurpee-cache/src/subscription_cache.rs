//! Lazily bulk-loaded, flush-invalidated view of subscribers and
//! subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use slurpee_core::error::Result;
use slurpee_store::{Store, Subscriber, Subscription};

use crate::pattern;

struct Snapshot {
    subscribers: HashMap<Uuid, Subscriber>,
    subscriptions: Vec<Subscription>,
}

/// In-memory cache of the full subscriber/subscription set.
///
/// Loaded lazily on first use under double-checked locking; any mutation
/// through the admin API calls [`SubscriptionCache::flush`], and the next
/// access reloads from the store. There is no partial invalidation - the
/// whole snapshot is small (one broker's worth of subscribers) and reloads
/// are cheap relative to how rarely they happen.
pub struct SubscriptionCache {
    store: Arc<dyn Store>,
    snapshot: RwLock<Option<Snapshot>>,
}

impl SubscriptionCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(None),
        }
    }

    async fn ensure_loaded(&self) -> Result<()> {
        {
            let guard = self.snapshot.read().await;
            if guard.is_some() {
                return Ok(());
            }
        }

        let mut guard = self.snapshot.write().await;
        if guard.is_some() {
            // Another task won the race and loaded it first.
            return Ok(());
        }

        let subscribers = self
            .store
            .list_subscribers()
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let subscriptions = self.store.list_subscriptions().await?;

        tracing::debug!(
            subscribers = subscribers.len(),
            subscriptions = subscriptions.len(),
            "subscription cache loaded"
        );

        *guard = Some(Snapshot {
            subscribers,
            subscriptions,
        });
        Ok(())
    }

    /// Subscriptions whose `subject_pattern` matches `subject`.
    pub async fn matching_subscriptions(&self, subject: &str) -> Result<Vec<Subscription>> {
        self.ensure_loaded().await?;
        let guard = self.snapshot.read().await;
        let snapshot = guard.as_ref().expect("just loaded");
        Ok(snapshot
            .subscriptions
            .iter()
            .filter(|s| pattern::matches(&s.subject_pattern, subject))
            .cloned()
            .collect())
    }

    pub async fn subscriber_by_id(&self, id: Uuid) -> Result<Option<Subscriber>> {
        self.ensure_loaded().await?;
        let guard = self.snapshot.read().await;
        Ok(guard.as_ref().expect("just loaded").subscribers.get(&id).cloned())
    }

    /// Invalidate the cache. The next access reloads from the store.
    pub async fn flush(&self) {
        *self.snapshot.write().await = None;
    }
}
