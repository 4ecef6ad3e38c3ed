//! Cache configuration types and builder
//!
//! Configures the LRU bound, the default entry TTL, the point in an entry's
//! life at which a read triggers a background refresh, and the optional grace
//! window during which an expired value may stand in for a failed reload.

use std::time::Duration;

use crate::resilience::{ConfigError, ConfigResult};

/// Default share of the TTL after which a read schedules a refresh.
pub const DEFAULT_REFRESH_THRESHOLD_PERCENT: u8 = 80;

/// Configuration for [`TtlCache`](super::TtlCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries before the least recently used is evicted.
    pub max_size: usize,

    /// TTL applied when a caller does not pass one.
    pub default_ttl: Duration,

    /// Percentage of the TTL after which a hit schedules a refresh.
    pub refresh_threshold_percent: u8,

    /// How long past expiry a value may be served when its reload fails.
    /// `None` means expiry is hard.
    pub stale_if_error: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 500,
            default_ttl: Duration::from_secs(300),
            refresh_threshold_percent: DEFAULT_REFRESH_THRESHOLD_PERCENT,
            stale_if_error: None,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Bounded cache with the given default TTL.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use erpshield_common::cache::CacheConfig;
    ///
    /// let config = CacheConfig::ttl_lru(Duration::from_secs(1800), 500);
    /// assert_eq!(config.refresh_threshold_percent, 80);
    /// ```
    pub fn ttl_lru(default_ttl: Duration, max_size: usize) -> Self {
        Self { max_size, default_ttl, ..Self::default() }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_size == 0 {
            return Err(ConfigError::Invalid {
                message: "cache max_size must be greater than 0".to_string(),
            });
        }

        if self.default_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                message: "cache default_ttl must be greater than 0".to_string(),
            });
        }

        if !(1..=100).contains(&self.refresh_threshold_percent) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "refresh_threshold_percent must be within 1..=100, got {}",
                    self.refresh_threshold_percent
                ),
            });
        }

        Ok(())
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = ttl;
        self
    }

    pub fn refresh_threshold_percent(mut self, percent: u8) -> Self {
        self.config.refresh_threshold_percent = percent;
        self
    }

    pub fn stale_if_error(mut self, grace: Option<Duration>) -> Self {
        self.config.stale_if_error = grace;
        self
    }

    pub fn build(self) -> ConfigResult<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Age after which an entry with `ttl` becomes eligible for refresh.
pub(crate) fn refresh_after(ttl: Duration, percent: u8) -> Duration {
    ttl * u32::from(percent.clamp(1, 100)) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stale_if_error, None);
    }

    #[test]
    fn test_builder_rejects_bad_threshold() {
        assert!(CacheConfig::builder().refresh_threshold_percent(0).build().is_err());
        assert!(CacheConfig::builder().refresh_threshold_percent(101).build().is_err());
        assert!(CacheConfig::builder().max_size(0).build().is_err());
        assert!(CacheConfig::builder().default_ttl(Duration::ZERO).build().is_err());
    }

    #[test]
    fn test_refresh_after_is_share_of_ttl() {
        assert_eq!(refresh_after(Duration::from_secs(100), 80), Duration::from_secs(80));
        assert_eq!(refresh_after(Duration::from_secs(1800), 80), Duration::from_secs(1440));
        assert_eq!(refresh_after(Duration::from_secs(10), 100), Duration::from_secs(10));
    }
}
