use super::clock::Clock;
use super::config::CacheConfig;
use super::fetcher::BackendClient;
use super::invalidation::{Invalidation, InvalidationBus};
use super::key::ResourceKey;
use super::metrics::{CacheMetrics, MetricsSnapshot};
use super::pipeline::{Pipeline, PipelineStatus};
use super::registry::Registry;
use super::subscription::Subscription;
use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The polling cache for one entity type.
///
/// Owns the type's refresh clock, its pipeline registry and its invalidation
/// bus. Different entity types get different `ResourceCache` instances and
/// never share any of these.
pub struct ResourceCache<B: BackendClient> {
    name: String,
    backend: Arc<B>,
    clock: Arc<Clock>,
    registry: Registry<B::Value>,
    bus: InvalidationBus,
    metrics: Arc<CacheMetrics>,
    shutdown: CancellationToken,
}

impl<B: BackendClient> ResourceCache<B> {
    /// Validates `config` and starts the entity type's refresh clock.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the configuration is unusable.
    pub fn start(name: impl Into<String>, config: &CacheConfig, backend: B) -> Result<Self> {
        config.validate()?;

        let name = name.into();
        let shutdown = CancellationToken::new();
        let clock = Clock::start(config.period(), shutdown.child_token());

        info!(
            "💾 Cache started: {} ({}s refresh, {} invalidation slots)",
            name,
            config.period().as_secs(),
            config.invalidation_capacity
        );

        Ok(Self {
            name,
            backend: Arc::new(backend),
            clock,
            registry: Registry::default(),
            bus: InvalidationBus::new(config.invalidation_capacity),
            metrics: Arc::new(CacheMetrics::default()),
            shutdown,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.clock.period()
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Subscribes to `key`. Never blocks: a cached value is already queued
    /// on the returned subscription, otherwise the first value arrives with
    /// the next successful fetch.
    pub fn observe(&self, key: ResourceKey) -> Subscription<B::Value> {
        self.registry.observe(&key, |key| {
            self.metrics.pipeline_created();
            Pipeline::spawn(
                key,
                Arc::clone(&self.backend),
                &self.clock,
                &self.bus,
                Arc::clone(&self.metrics),
                self.shutdown.child_token(),
            )
        })
    }

    /// Latest cached value for `key` without subscribing
    #[must_use]
    pub fn peek(&self, key: &ResourceKey) -> Option<Arc<B::Value>> {
        self.registry.get(key).and_then(|pipeline| pipeline.latest())
    }

    /// Refetches every live pipeline of this type, then empties the registry
    /// so the next `observe` starts from a fresh pipeline.
    pub fn invalidate_all(&self) {
        self.metrics.invalidated();
        let signalled = self.bus.notify(Invalidation::All);
        let cleared = self.registry.clear();
        info!(
            "🔄 INVALIDATE ALL: {} ({} signalled, {} cleared)",
            self.name, signalled, cleared
        );
    }

    /// Refetches the pipelines for `key` and drops it from the registry.
    /// Sibling keys are left alone.
    pub fn invalidate(&self, key: &ResourceKey) {
        self.metrics.invalidated();
        self.bus.notify(Invalidation::Key(key.clone()));
        let cleared = self.registry.clear_key(key);
        info!("🔄 INVALIDATE KEY: {} {} (cleared: {})", self.name, key, cleared);
    }

    /// Runs a pass-through write and, only if it succeeded, invalidates
    /// every scope in `scopes`.
    ///
    /// # Errors
    ///
    /// Returns the write's own error unchanged; the cache is left as it was.
    pub async fn write<T, E, F, I>(&self, scopes: I, write: F) -> core::result::Result<T, E>
    where
        F: Future<Output = core::result::Result<T, E>>,
        I: IntoIterator<Item = Invalidation>,
    {
        let outcome = write.await;
        if outcome.is_ok() {
            for scope in scopes {
                match scope {
                    Invalidation::All => self.invalidate_all(),
                    Invalidation::Key(key) => self.invalidate(&key),
                }
            }
        } else {
            debug!("✋ Write failed on {}; cache left untouched", self.name);
        }
        outcome
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut pipelines: Vec<PipelineStatus> = self
            .registry
            .pipelines()
            .iter()
            .map(|pipeline| pipeline.status())
            .collect();
        pipelines.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            subscribers: pipelines.iter().map(|p| p.subscribers).sum(),
            pipelines,
            metrics: self.metrics.snapshot(),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops the clock and every pipeline; open subscriptions end
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("🛑 Cache shutting down: {}", self.name);
            self.shutdown.cancel();
        }
    }
}

impl<B: BackendClient> Drop for ResourceCache<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Registry contents of one entity type
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub pipelines: Vec<PipelineStatus>,
    pub subscribers: usize,
    pub metrics: MetricsSnapshot,
}
