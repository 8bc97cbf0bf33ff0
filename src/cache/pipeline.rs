/**
 * Per-key fetch pipeline
 *
 * One driver task per key merges clock ticks and invalidation signals into
 * at most one outstanding backend fetch, and fans every result out to the
 * current subscribers. The latest good value is replayed to late subscribers.
 */
use super::cached_value::{CachedValue, FetchStatus};
use super::clock::{Clock, Tick, Ticks};
use super::errors::FetchError;
use super::fetcher::BackendClient;
use super::invalidation::{InvalidationBus, InvalidationListener};
use super::key::ResourceKey;
use super::metrics::CacheMetrics;
use super::subscription::{CacheEvent, Subscriber, Subscribers, Subscription};
use futures::future::{BoxFuture, OptionFuture};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Shared<V> {
    latest: Option<CachedValue<V>>,
    subscribers: Subscribers<V>,
    status: FetchStatus,
    /// The driver has exited; nothing will ever be delivered again
    retired: bool,
}

/// Handle to one key's pipeline, held by the registry.
pub struct Pipeline<V> {
    key: ResourceKey,
    shared: Mutex<Shared<V>>,
    orphaned: AtomicBool,
    wake: Notify,
}

/// Point-in-time view of a pipeline for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    pub key: ResourceKey,
    pub status: FetchStatus,
    pub version: u64,
    pub age: Option<Duration>,
    pub subscribers: usize,
}

impl<V: Send + Sync + 'static> Pipeline<V> {
    /// Creates the pipeline and spawns its driver. The first fetch starts
    /// right away.
    pub(crate) fn spawn<B>(
        key: ResourceKey,
        backend: Arc<B>,
        clock: &Clock,
        bus: &InvalidationBus,
        metrics: Arc<CacheMetrics>,
        shutdown: CancellationToken,
    ) -> Arc<Self>
    where
        B: BackendClient<Value = V>,
    {
        let pipeline = Arc::new(Self {
            key,
            shared: Mutex::new(Shared {
                latest: None,
                subscribers: Subscribers::default(),
                status: FetchStatus::Idle,
                retired: false,
            }),
            orphaned: AtomicBool::new(false),
            wake: Notify::new(),
        });

        let driver = Driver {
            pipeline: Arc::clone(&pipeline),
            backend,
            ticks: clock.ticks(),
            invalidations: bus.subscribe(),
            metrics,
            shutdown,
            pending: false,
            fetch_started: None,
        };
        tokio::spawn(driver.run());

        pipeline
    }
}

impl<V> Pipeline<V> {
    #[must_use]
    pub const fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Attaches a subscriber. A cached value is delivered before this returns.
    ///
    /// Returns `None` once the driver has retired.
    pub fn subscribe(&self) -> Option<Subscription<V>> {
        let mut shared = self.lock();
        if shared.retired {
            debug!("⚰️  Subscribe refused, pipeline retired: {}", self.key);
            return None;
        }
        let (subscriber, subscription) = Subscriber::new(self.key.clone());

        if let Some(cached) = &shared.latest {
            debug!("🎯 Cache HIT: {} (v{}) for {}", self.key, cached.version, subscriber.id);
            subscriber.send(CacheEvent::Value(Arc::clone(&cached.value)));
        } else {
            debug!("❌ Cache MISS: {} for {}", self.key, subscriber.id);
        }
        shared.subscribers.push(subscriber);
        drop(shared);

        Some(subscription)
    }

    /// Latest successful value, if any
    pub fn latest(&self) -> Option<Arc<V>> {
        self.lock().latest.as_ref().map(|cached| Arc::clone(&cached.value))
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.live()
    }

    /// Marks the pipeline as no longer reachable through the registry
    pub(crate) fn orphan(&self) {
        self.orphaned.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_orphaned(&self) -> bool {
        self.orphaned.load(Ordering::Acquire)
    }

    /// Orphaned with nobody listening: nothing it fetches can reach anyone
    fn is_abandoned(&self) -> bool {
        self.is_orphaned() && self.subscriber_count() == 0
    }

    #[allow(clippy::significant_drop_tightening)]
    pub fn status(&self) -> PipelineStatus {
        let mut shared = self.lock();
        PipelineStatus {
            key: self.key.clone(),
            status: shared.status.clone(),
            version: shared.latest.as_ref().map_or(0, |cached| cached.version),
            age: shared.latest.as_ref().map(CachedValue::age),
            subscribers: shared.subscribers.live(),
        }
    }

    fn set_status(&self, status: FetchStatus) {
        self.lock().status = status;
    }

    /// Stores `value` as latest and sends it to every current subscriber.
    /// Returns the new version and how many subscribers received it.
    fn publish(&self, value: V) -> (u64, usize) {
        let mut shared = self.lock();
        let cached = match shared.latest.take() {
            Some(mut cached) => {
                cached.update(value);
                cached
            }
            None => CachedValue::new(value),
        };
        let event = CacheEvent::Value(Arc::clone(&cached.value));
        let version = cached.version;
        shared.latest = Some(cached);
        shared.status = FetchStatus::Idle;
        let delivered = shared.subscribers.broadcast(&event);
        drop(shared);
        (version, delivered)
    }

    /// Reports a failure to current subscribers only; the cached value stays
    fn publish_error(&self, err: FetchError) -> usize {
        let mut shared = self.lock();
        shared.status = FetchStatus::Error(err.to_string());
        let delivered = shared.subscribers.broadcast(&CacheEvent::Error(err));
        drop(shared);
        delivered
    }

    /// Retires the pipeline if it is orphaned and nobody listens. Decided
    /// under the same lock `subscribe` takes, so no subscriber can slip in.
    fn retire_if_abandoned(&self) -> bool {
        let mut shared = self.lock();
        if self.is_orphaned() && shared.subscribers.live() == 0 {
            shared.retired = true;
            return true;
        }
        false
    }

    /// Drops every subscriber sender so their streams end
    fn close(&self) {
        let mut shared = self.lock();
        shared.retired = true;
        shared.subscribers = Subscribers::default();
    }

    #[cfg(test)]
    pub(crate) fn is_retired(&self) -> bool {
        self.lock().retired
    }

    fn lock(&self) -> MutexGuard<'_, Shared<V>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single writer for a pipeline's fetch state
struct Driver<B: BackendClient> {
    pipeline: Arc<Pipeline<B::Value>>,
    backend: Arc<B>,
    ticks: Ticks,
    invalidations: InvalidationListener,
    metrics: Arc<CacheMetrics>,
    shutdown: CancellationToken,
    /// A trigger arrived while a fetch was outstanding
    pending: bool,
    fetch_started: Option<Instant>,
}

type FetchFuture<V> = BoxFuture<'static, Result<V, FetchError>>;

impl<B: BackendClient> Driver<B> {
    async fn run(mut self) {
        let key = self.pipeline.key.clone();
        debug!("🚀 Pipeline started: {}", key);

        let mut in_flight: Option<FetchFuture<B::Value>> = None;

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    debug!("🛑 Pipeline shutting down: {}", key);
                    break;
                }
                () = self.pipeline.wake.notified() => {}
                tick = self.ticks.next() => match tick {
                    Some(Tick::Start) => self.request(&mut in_flight, "start"),
                    Some(Tick::Periodic) => {
                        // Idle: keep the cached value, skip the poll
                        if self.pipeline.subscriber_count() > 0 {
                            self.request(&mut in_flight, "tick");
                        }
                    }
                    None => break,
                },
                signal = self.invalidations.next() => match signal {
                    Some(signal) if signal.applies_to(&key) => {
                        self.request(&mut in_flight, "invalidation");
                    }
                    Some(_) => {}
                    None => break,
                },
                Some(outcome) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    in_flight = None;
                    self.complete(outcome);
                    if std::mem::take(&mut self.pending) && !self.pipeline.is_abandoned() {
                        in_flight = Some(self.start_fetch());
                    }
                }
            }

            if in_flight.is_none() && self.pipeline.retire_if_abandoned() {
                debug!("🧹 Orphaned pipeline retired: {}", key);
                break;
            }
        }

        self.pipeline.close();
    }

    /// Starts a fetch, or coalesces into the one already outstanding
    fn request(&mut self, in_flight: &mut Option<FetchFuture<B::Value>>, reason: &str) {
        if self.pipeline.is_abandoned() {
            return;
        }
        if in_flight.is_some() {
            self.pending = true;
            self.metrics.trigger_coalesced();
            debug!("🔁 COALESCED: {} ({})", self.pipeline.key, reason);
            return;
        }
        debug!("🔄 FETCH START: {} ({})", self.pipeline.key, reason);
        *in_flight = Some(self.start_fetch());
    }

    fn start_fetch(&mut self) -> FetchFuture<B::Value> {
        self.metrics.fetch_started();
        self.pipeline.set_status(FetchStatus::Fetching);
        self.fetch_started = Some(Instant::now());

        let backend = Arc::clone(&self.backend);
        let key = self.pipeline.key.clone();
        Box::pin(async move { backend.fetch(&key).await })
    }

    fn complete(&mut self, outcome: Result<B::Value, FetchError>) {
        let elapsed = self
            .fetch_started
            .take()
            .map_or(Duration::ZERO, |started| started.elapsed());
        let key = &self.pipeline.key;

        if self.pipeline.is_abandoned() {
            self.metrics.stale_discarded();
            debug!("🗑️  STALE FETCH DISCARDED: {} ({:.2}s)", key, elapsed.as_secs_f64());
            return;
        }

        match outcome {
            Ok(value) => {
                self.metrics.fetch_succeeded();
                let (version, delivered) = self.pipeline.publish(value);
                info!(
                    "✅ FETCH SUCCESS: {} v{} -> {} subscribers ({:.2}s)",
                    key,
                    version,
                    delivered,
                    elapsed.as_secs_f64()
                );
            }
            Err(err) => {
                self.metrics.fetch_failed();
                warn!("❌ FETCH FAILED: {} ({:.2}s) - {}", key, elapsed.as_secs_f64(), err);
                self.pipeline.publish_error(err);
            }
        }
    }
}
