use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// The latest successful fetch result held by a pipeline.
#[derive(Debug)]
pub struct CachedValue<V> {
    pub value: Arc<V>,
    pub last_updated: Instant,
    pub version: u64, // Successful fetches so far
}

impl<V> Clone for CachedValue<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            last_updated: self.last_updated,
            version: self.version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Fetching,
    Error(String),
}

impl<V> CachedValue<V> {
    pub fn new(value: V) -> Self {
        Self {
            value: Arc::new(value),
            last_updated: Instant::now(),
            version: 1,
        }
    }

    pub fn age(&self) -> Duration {
        self.last_updated.elapsed()
    }

    /// Replaces the value, bumping the version
    pub fn update(&mut self, value: V) {
        self.value = Arc::new(value);
        self.last_updated = Instant::now();
        self.version += 1;
    }
}
