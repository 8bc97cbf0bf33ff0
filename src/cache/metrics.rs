use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one entity type's pipelines
#[derive(Debug, Default)]
pub struct CacheMetrics {
    pipelines_created: AtomicU64,
    fetches_started: AtomicU64,
    fetches_succeeded: AtomicU64,
    fetches_failed: AtomicU64,
    coalesced_triggers: AtomicU64,
    stale_discarded: AtomicU64,
    invalidations: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub pipelines_created: u64,
    pub fetches_started: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    pub coalesced_triggers: u64,
    pub stale_discarded: u64,
    pub invalidations: u64,
}

impl MetricsSnapshot {
    /// Share of completed fetches that succeeded (0.0 to 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.fetches_succeeded + self.fetches_failed;
        if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.fetches_succeeded as f64 / total as f64
            }
        }
    }
}

impl CacheMetrics {
    pub(crate) fn pipeline_created(&self) {
        self.pipelines_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fetch_succeeded(&self) {
        self.fetches_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fetch_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn trigger_coalesced(&self) {
        self.coalesced_triggers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale_discarded(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalidated(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pipelines_created: self.pipelines_created.load(Ordering::Relaxed),
            fetches_started: self.fetches_started.load(Ordering::Relaxed),
            fetches_succeeded: self.fetches_succeeded.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            coalesced_triggers: self.coalesced_triggers.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}
