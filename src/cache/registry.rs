use super::key::ResourceKey;
use super::pipeline::Pipeline;
use super::subscription::{Subscriber, Subscription};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Maps each key of one entity type to its live pipeline.
///
/// Lookup-or-create and subscribe run under one lock, so concurrent first
/// readers of a key always end up on the same pipeline, and a pipeline can't
/// be orphaned between being found and being subscribed to.
pub struct Registry<V> {
    entries: Mutex<HashMap<ResourceKey, Arc<Pipeline<V>>>>,
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> Registry<V> {
    /// Subscribes to the pipeline for `key`, building it with `create` if
    /// absent or if the registered one has already retired.
    pub fn observe<F>(&self, key: &ResourceKey, create: F) -> Subscription<V>
    where
        F: FnOnce(ResourceKey) -> Arc<Pipeline<V>>,
    {
        let mut entries = self.lock();
        if let Some(subscription) = entries.get(key).and_then(|pipeline| pipeline.subscribe()) {
            return subscription;
        }

        debug!("🆕 Pipeline created: {}", key);
        let pipeline = create(key.clone());
        entries.insert(key.clone(), Arc::clone(&pipeline));
        // Only a cancelled cache retires a fresh pipeline; its subscribers just end
        pipeline.subscribe().unwrap_or_else(|| Subscriber::new(key.clone()).1)
    }

    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<Arc<Pipeline<V>>> {
        self.lock().get(key).cloned()
    }

    /// Removes every entry; the removed pipelines become orphans
    pub fn clear(&self) -> usize {
        let removed: Vec<_> = self.lock().drain().map(|(_, pipeline)| pipeline).collect();
        for pipeline in &removed {
            pipeline.orphan();
        }
        removed.len()
    }

    /// Removes one entry; the removed pipeline becomes an orphan
    pub fn clear_key(&self, key: &ResourceKey) -> bool {
        let removed = self.lock().remove(key);
        removed.is_some_and(|pipeline| {
            pipeline.orphan();
            true
        })
    }

    #[must_use]
    pub fn pipelines(&self) -> Vec<Arc<Pipeline<V>>> {
        self.lock().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceKey, Arc<Pipeline<V>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::Clock;
    use crate::cache::errors::FetchError;
    use crate::cache::fetcher::BackendClient;
    use crate::cache::invalidation::InvalidationBus;
    use crate::cache::metrics::CacheMetrics;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    struct StaticBackend;

    #[async_trait]
    impl BackendClient for StaticBackend {
        type Value = String;

        async fn fetch(&self, key: &ResourceKey) -> Result<String, FetchError> {
            Ok(key.to_string())
        }
    }

    fn build<'a>(
        clock: &'a Clock,
        bus: &'a InvalidationBus,
    ) -> impl FnOnce(ResourceKey) -> Arc<Pipeline<String>> + 'a {
        move |key| {
            Pipeline::spawn(
                key,
                Arc::new(StaticBackend),
                clock,
                bus,
                Arc::new(CacheMetrics::default()),
                CancellationToken::new(),
            )
        }
    }

    #[tokio::test]
    async fn test_observe_reuses_pipeline() {
        let clock = Clock::start(Duration::from_secs(10), CancellationToken::new());
        let bus = InvalidationBus::new(8);
        let registry = Registry::default();
        let key = ResourceKey::collection("proj1");

        let _first = registry.observe(&key, build(&clock, &bus));
        let first = registry.get(&key).unwrap();
        let _second = registry.observe(&key, |_| panic!("pipeline must be reused"));

        assert!(Arc::ptr_eq(&first, &registry.get(&key).unwrap()));
        assert_eq!(first.subscriber_count(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_creates_once() {
        let clock = Clock::start(Duration::from_secs(10), CancellationToken::new());
        let bus = Arc::new(InvalidationBus::new(8));
        let registry = Arc::new(Registry::default());
        let created = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let bus = Arc::clone(&bus);
            let clock = Arc::clone(&clock);
            let created = Arc::clone(&created);
            handles.push(tokio::spawn(async move {
                let key = ResourceKey::collection("proj1");
                registry.observe(&key, |k| {
                    created.fetch_add(1, Ordering::SeqCst);
                    build(&clock, &bus)(k)
                })
            }));
        }

        let mut subscriptions = Vec::new();
        for handle in handles {
            subscriptions.push(handle.await.unwrap());
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        let pipeline = registry.get(&ResourceKey::collection("proj1")).unwrap();
        assert_eq!(pipeline.subscriber_count(), 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_replaces_retired_pipeline() {
        let clock = Clock::start(Duration::from_secs(10), CancellationToken::new());
        let bus = InvalidationBus::new(8);
        let registry = Registry::default();
        let key = ResourceKey::collection("proj1");

        drop(registry.observe(&key, build(&clock, &bus)));
        let retired = registry.get(&key).unwrap();
        // Orphaned while still registered: the driver retires with nobody listening
        retired.orphan();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(retired.is_retired());

        let mut subscription = registry.observe(&key, build(&clock, &bus));
        let fresh = registry.get(&key).unwrap();
        assert!(!Arc::ptr_eq(&retired, &fresh));

        let value = timeout(Duration::from_secs(5), subscription.next_value()).await;
        assert_eq!(value.unwrap().as_deref().map(String::as_str), Some("proj1:*"));
    }

    #[tokio::test]
    async fn test_clear_orphans_everything() {
        let clock = Clock::start(Duration::from_secs(10), CancellationToken::new());
        let bus = InvalidationBus::new(8);
        let registry = Registry::default();
        let proj1 = ResourceKey::collection("proj1");
        let proj2 = ResourceKey::collection("proj2");

        let _first = registry.observe(&proj1, build(&clock, &bus));
        let _second = registry.observe(&proj2, build(&clock, &bus));
        let old1 = registry.get(&proj1).unwrap();
        let old2 = registry.get(&proj2).unwrap();

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert!(old1.is_orphaned());
        assert!(old2.is_orphaned());

        let _fresh = registry.observe(&proj1, build(&clock, &bus));
        let fresh = registry.get(&proj1).unwrap();
        assert!(!Arc::ptr_eq(&old1, &fresh));
        assert!(!fresh.is_orphaned());
    }

    #[tokio::test]
    async fn test_clear_key_leaves_siblings() {
        let clock = Clock::start(Duration::from_secs(10), CancellationToken::new());
        let bus = InvalidationBus::new(8);
        let registry = Registry::default();
        let proj1 = ResourceKey::collection("proj1");
        let proj2 = ResourceKey::collection("proj2");

        let _first = registry.observe(&proj1, build(&clock, &bus));
        let _second = registry.observe(&proj2, build(&clock, &bus));
        let first = registry.get(&proj1).unwrap();
        let sibling = registry.get(&proj2).unwrap();

        assert!(registry.clear_key(&proj1));
        assert!(!registry.clear_key(&proj1));
        assert!(first.is_orphaned());
        assert!(!sibling.is_orphaned());
        assert!(registry.get(&proj1).is_none());
        assert!(registry.get(&proj2).is_some());
    }
}
