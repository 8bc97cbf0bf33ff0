pub mod cached_value;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod invalidation;
pub mod key;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod resource_cache;
pub mod subscription;

pub use cached_value::{CachedValue, FetchStatus};
pub use clock::{Clock, Tick, Ticks};
pub use config::CacheConfig;
pub use errors::FetchError;
pub use fetcher::BackendClient;
pub use invalidation::{Invalidation, InvalidationBus};
pub use key::ResourceKey;
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use pipeline::{Pipeline, PipelineStatus};
pub use resource_cache::{CacheStats, ResourceCache};
pub use subscription::{CacheEvent, Subscription};
