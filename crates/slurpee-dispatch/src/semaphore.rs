//! Per-subscriber concurrency caps.
//!
//! One counting semaphore per subscriber, sized to `max_parallel`. Entries
//! are created on first use; if a subscriber's `max_parallel` changes, the
//! existing semaphore's capacity is fixed, so we swap in a
//! fresh one rather than trying to resize in place.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

#[derive(Default)]
pub struct SemaphoreRegistry {
    inner: Mutex<HashMap<Uuid, (u32, Arc<Semaphore>)>>,
}

impl SemaphoreRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the semaphore for `subscriber_id`, sized to `max_parallel`.
    /// Creates it on first use; replaces it if the capacity on file no
    /// longer matches.
    pub async fn get(&self, subscriber_id: Uuid, max_parallel: u32) -> Arc<Semaphore> {
        let max_parallel = max_parallel.max(1);
        let mut guard = self.inner.lock().await;

        match guard.get(&subscriber_id) {
            Some((capacity, sem)) if *capacity == max_parallel => sem.clone(),
            _ => {
                let sem = Arc::new(Semaphore::new(max_parallel as usize));
                guard.insert(subscriber_id, (max_parallel, sem.clone()));
                sem
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_capacity_returns_the_same_semaphore() {
        let registry = SemaphoreRegistry::new();
        let id = Uuid::now_v7();

        let a = registry.get(id, 4).await;
        let b = registry.get(id, 4).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn changed_capacity_replaces_the_semaphore() {
        let registry = SemaphoreRegistry::new();
        let id = Uuid::now_v7();

        let a = registry.get(id, 4).await;
        let b = registry.get(id, 8).await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.available_permits(), 8);
    }

    #[tokio::test]
    async fn zero_max_parallel_is_floored_to_one() {
        let registry = SemaphoreRegistry::new();
        let sem = registry.get(Uuid::now_v7(), 0).await;
        assert_eq!(sem.available_permits(), 1);
    }
}
