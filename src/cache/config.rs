/**
 * Configuration constants and refresh settings for the resource cache
 */
use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Default tick spacing unit in seconds
pub const DEFAULT_BASE_INTERVAL_SECS: u64 = 1;

/// Default number of base intervals between two clock ticks
pub const DEFAULT_REFRESH_MULTIPLIER: u32 = 10;

/// Channel buffer size for invalidation events
pub const INVALIDATION_CHANNEL_CAPACITY: usize = 100;

/// Channel buffer size for clock ticks
pub const CLOCK_CHANNEL_CAPACITY: usize = 16;

/// Refresh settings for one entity type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Tick spacing unit
    pub base_interval_secs: u64,
    /// Multiplies the base interval to give the clock period
    pub refresh_multiplier: u32,
    /// Invalidation signals buffered per entity type before pipelines lag
    pub invalidation_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: DEFAULT_BASE_INTERVAL_SECS,
            refresh_multiplier: DEFAULT_REFRESH_MULTIPLIER,
            invalidation_capacity: INVALIDATION_CHANNEL_CAPACITY,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn new(base_interval_secs: u64, refresh_multiplier: u32) -> Self {
        Self {
            base_interval_secs,
            refresh_multiplier,
            ..Self::default()
        }
    }

    /// Clock period: base interval times the refresh multiplier
    #[must_use]
    pub fn period(&self) -> Duration {
        let secs = self.base_interval_secs.saturating_mul(u64::from(self.refresh_multiplier));
        Duration::from_secs(secs)
    }

    /// Checks that every setting yields a usable clock.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if any value is zero.
    pub fn validate(&self) -> Result<()> {
        if self.base_interval_secs == 0 {
            return Err(invalid("base_interval_secs"));
        }
        if self.refresh_multiplier == 0 {
            return Err(invalid("refresh_multiplier"));
        }
        if self.invalidation_capacity == 0 {
            return Err(invalid("invalidation_capacity"));
        }
        Ok(())
    }
}

fn invalid(field: &str) -> Error {
    Error::InvalidConfig(format!("{field} must be greater than 0"))
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(DEFAULT_BASE_INTERVAL_SECS > 0, "DEFAULT_BASE_INTERVAL_SECS must be greater than 0");
    assert!(DEFAULT_REFRESH_MULTIPLIER > 0, "DEFAULT_REFRESH_MULTIPLIER must be greater than 0");
    assert!(
        INVALIDATION_CHANNEL_CAPACITY > 0,
        "INVALIDATION_CHANNEL_CAPACITY must be greater than 0"
    );
    assert!(CLOCK_CHANNEL_CAPACITY > 0, "CLOCK_CHANNEL_CAPACITY must be greater than 0");
};
