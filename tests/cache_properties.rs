use async_trait::async_trait;
use clustercache::cache::{
    BackendClient, CacheConfig, CacheEvent, FetchError, FetchStatus, ResourceCache, ResourceKey,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Counts fetches per key; each value is that key's call number
struct KeyedBackend {
    calls: Mutex<HashMap<ResourceKey, usize>>,
    latency: Duration,
    failing: AtomicBool,
}

impl KeyedBackend {
    fn new(latency: Duration) -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            latency,
            failing: AtomicBool::new(false),
        }
    }

    fn calls(&self, key: &ResourceKey) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BackendClient for KeyedBackend {
    type Value = usize;

    async fn fetch(&self, key: &ResourceKey) -> Result<usize, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(key.clone()).or_default();
            *count += 1;
            *count
        };
        sleep(self.latency).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::status(503, "unavailable"));
        }
        Ok(call)
    }
}

fn start(latency: Duration) -> ResourceCache<KeyedBackend> {
    ResourceCache::start("clusters", &CacheConfig::default(), KeyedBackend::new(latency)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_observers_share_one_fetch() {
    let cache = start(Duration::from_secs(1));
    let key = ResourceKey::collection("proj1");

    let mut subscriptions: Vec<_> = (0..10).map(|_| cache.observe(key.clone())).collect();
    for subscription in &mut subscriptions {
        assert_eq!(subscription.next_value().await.as_deref(), Some(&1));
    }

    assert_eq!(cache.backend().calls(&key), 1);
    assert_eq!(cache.stats().pipelines.len(), 1);
    assert_eq!(cache.stats().subscribers, 10);
}

#[tokio::test(start_paused = true)]
async fn test_cached_observe_replays_without_fetching() {
    let cache = start(Duration::from_secs(1));
    let key = ResourceKey::collection("proj1");
    let mut first = cache.observe(key.clone());
    first.next_value().await;

    let mut second = cache.observe(key.clone());
    let replayed = second.try_recv().and_then(|event| event.value().cloned());
    assert_eq!(replayed.as_deref(), Some(&1));
    assert_eq!(cache.backend().calls(&key), 1);
}

#[tokio::test(start_paused = true)]
async fn test_observe_after_invalidate_is_fresh_during_fetch() {
    let cache = start(Duration::from_secs(2));
    let key = ResourceKey::collection("proj1");
    let mut before = cache.observe(key.clone());

    // Fetch #1 is still outstanding
    sleep(Duration::from_millis(500)).await;
    cache.invalidate(&key);
    let mut after = cache.observe(key.clone());
    assert!(after.try_recv().is_none());

    assert_eq!(after.next_value().await.as_deref(), Some(&2));
    // The earlier subscriber sees its own fetch, then the coalesced refetch
    assert_eq!(before.next_value().await.as_deref(), Some(&1));
    assert_eq!(before.next_value().await.as_deref(), Some(&3));
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_last_good_value() {
    let cache = start(Duration::from_millis(500));
    let key = ResourceKey::collection("proj1");
    let mut subscription = cache.observe(key.clone());
    assert_eq!(subscription.next_value().await.as_deref(), Some(&1));

    cache.backend().failing.store(true, Ordering::SeqCst);
    // The clock tick at t=10 fetches and fails
    let event = subscription.recv().await.unwrap();
    assert!(matches!(event, CacheEvent::Error(FetchError::Status { code: 503, .. })));

    let mut late = cache.observe(key.clone());
    let replayed = late.try_recv().and_then(|event| event.value().cloned());
    assert_eq!(replayed.as_deref(), Some(&1));
    assert_eq!(cache.peek(&key).as_deref(), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn test_next_tick_recovers_after_failure() {
    let cache = start(Duration::from_millis(500));
    let key = ResourceKey::collection("proj1");
    let mut subscription = cache.observe(key.clone());
    assert_eq!(subscription.next_value().await.as_deref(), Some(&1));

    cache.backend().failing.store(true, Ordering::SeqCst);
    assert!(subscription.recv().await.is_some_and(|event| event.is_error()));
    assert_eq!(cache.stats().pipelines[0].version, 1);

    cache.backend().failing.store(false, Ordering::SeqCst);
    // Tick at t=20: the same subscription picks up where it left off
    assert_eq!(subscription.next_value().await.as_deref(), Some(&3));
    let stats = cache.stats();
    let status = &stats.pipelines[0];
    assert_eq!(status.version, 2);
    assert_eq!(status.status, FetchStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_tick_during_manual_refresh_coalesces() {
    let cache = start(Duration::from_secs(2));
    let key = ResourceKey::collection("proj1");
    let origin = Instant::now();
    let mut subscription = cache.observe(key.clone());
    subscription.next_value().await;

    sleep(Duration::from_millis(9_500) - origin.elapsed()).await;
    let before = cache.metrics();
    // Fetch runs 9.5..11.5, so the t=10 tick lands mid-flight
    cache.invalidate(&key);

    assert_eq!(subscription.next_value().await.as_deref(), Some(&2));
    assert_eq!(subscription.next_value().await.as_deref(), Some(&3));
    assert_eq!(origin.elapsed(), Duration::from_millis(13_500));
    sleep(Duration::from_secs(5)).await;

    let after = cache.metrics();
    assert_eq!(after.fetches_started - before.fetches_started, 2);
    assert_eq!(after.coalesced_triggers, 1);
    assert_eq!(cache.backend().calls(&key), 3);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_burst_coalesces() {
    let cache = start(Duration::from_secs(3));
    let key = ResourceKey::collection("proj1");
    let mut subscription = cache.observe(key.clone());
    sleep(Duration::from_millis(10)).await;

    for _ in 0..5 {
        cache.invalidate_all();
    }

    assert_eq!(subscription.next_value().await.as_deref(), Some(&1));
    assert_eq!(subscription.next_value().await.as_deref(), Some(&2));
    sleep(Duration::from_secs(1)).await;

    assert_eq!(cache.backend().calls(&key), 2);
    let metrics = cache.metrics();
    assert_eq!(metrics.invalidations, 5);
    assert_eq!(metrics.coalesced_triggers, 5);
}

#[tokio::test(start_paused = true)]
async fn test_invalidation_and_tick_timeline() {
    let cache = start(Duration::from_secs(1));
    let key = ResourceKey::collection("proj1");
    let origin = Instant::now();
    let mut subscription = cache.observe(key.clone());

    assert_eq!(subscription.next_value().await.as_deref(), Some(&1));
    assert_eq!(origin.elapsed(), Duration::from_secs(1));

    sleep(Duration::from_secs(2)).await;
    cache.invalidate(&key);
    assert_eq!(subscription.next_value().await.as_deref(), Some(&2));
    assert_eq!(origin.elapsed(), Duration::from_secs(4));

    assert_eq!(subscription.next_value().await.as_deref(), Some(&3));
    assert_eq!(origin.elapsed(), Duration::from_secs(11));
}

#[tokio::test(start_paused = true)]
async fn test_keys_refresh_independently() {
    let cache = start(Duration::from_millis(500));
    let proj1 = ResourceKey::collection("proj1");
    let proj2 = ResourceKey::collection("proj2");
    let mut first = cache.observe(proj1.clone());
    let mut second = cache.observe(proj2.clone());
    first.next_value().await;
    second.next_value().await;

    cache.invalidate(&proj1);
    assert_eq!(first.next_value().await.as_deref(), Some(&2));
    sleep(Duration::from_secs(1)).await;

    assert_eq!(cache.backend().calls(&proj1), 2);
    assert_eq!(cache.backend().calls(&proj2), 1);
    assert!(second.try_recv().is_none());
    assert_eq!(cache.stats().pipelines.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unobserved_pipeline_is_retired_without_fetching() {
    let cache = start(Duration::from_millis(500));
    let key = ResourceKey::collection("proj1");
    let mut subscription = cache.observe(key.clone());
    subscription.next_value().await;
    drop(subscription);

    cache.invalidate_all();
    sleep(Duration::from_secs(30)).await;

    assert_eq!(cache.backend().calls(&key), 1);
    assert!(cache.stats().pipelines.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_entity_caches_do_not_share_clocks() {
    let backend = || KeyedBackend::new(Duration::ZERO);
    let fast = ResourceCache::start("fast", &CacheConfig::new(1, 2), backend()).unwrap();
    let slow = ResourceCache::start("slow", &CacheConfig::new(1, 20), backend()).unwrap();
    let key = ResourceKey::collection("proj1");
    let _fast_subscription = fast.observe(key.clone());
    let _slow_subscription = slow.observe(key.clone());

    sleep(Duration::from_millis(10_500)).await;
    assert_eq!(fast.backend().calls(&key), 6);
    assert_eq!(slow.backend().calls(&key), 1);
    assert_eq!(fast.period(), Duration::from_secs(2));
}
