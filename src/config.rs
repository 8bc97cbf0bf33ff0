/**
 * Service-level configuration: one refresh rate per entity type
 */
use crate::cache::CacheConfig;
use crate::cache::config::{
    DEFAULT_BASE_INTERVAL_SECS, DEFAULT_REFRESH_MULTIPLIER, INVALIDATION_CHANNEL_CAPACITY,
};
use crate::clusters::EntityType;
use crate::error::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClusterServiceConfig {
    pub base_interval_secs: u64,
    pub cluster_refresh_multiplier: u32,
    pub external_cluster_refresh_multiplier: u32,
    pub invalidation_capacity: usize,
}

impl Default for ClusterServiceConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: DEFAULT_BASE_INTERVAL_SECS,
            cluster_refresh_multiplier: DEFAULT_REFRESH_MULTIPLIER,
            external_cluster_refresh_multiplier: DEFAULT_REFRESH_MULTIPLIER,
            invalidation_capacity: INVALIDATION_CHANNEL_CAPACITY,
        }
    }
}

impl ClusterServiceConfig {
    /// Reads a JSON config file; missing keys fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file can't be read, `Error::Json` if it
    /// doesn't parse and `Error::InvalidConfig` if a value is unusable.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        debug!("⚙️  Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Cache settings for one entity type
    #[must_use]
    pub fn cache_config(&self, entity: EntityType) -> CacheConfig {
        let refresh_multiplier = match entity {
            EntityType::Cluster => self.cluster_refresh_multiplier,
            EntityType::ExternalCluster => self.external_cluster_refresh_multiplier,
        };
        CacheConfig {
            base_interval_secs: self.base_interval_secs,
            refresh_multiplier,
            invalidation_capacity: self.invalidation_capacity,
        }
    }

    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if either entity's cache settings are unusable.
    pub fn validate(&self) -> Result<()> {
        self.cache_config(EntityType::Cluster).validate()?;
        self.cache_config(EntityType::ExternalCluster).validate()
    }
}
