//! Pool sizing and timing configuration.

use std::time::Duration;

use crate::resilience::{ConfigError, ConfigResult};

/// Configuration for [`ConnectionPool`](super::ConnectionPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Sessions kept alive by warm-up and idle eviction.
    pub min_size: usize,
    /// Hard cap on live sessions, borrowed or not.
    pub max_size: usize,
    /// Default wait for [`ConnectionPool::acquire_default`](super::ConnectionPool::acquire_default).
    pub acquire_timeout: Duration,
    /// Idle age after which a session becomes eligible for eviction.
    pub idle_timeout: Duration,
    /// Period of the background eviction sweep.
    pub eviction_interval: Duration,
    /// Health-check sessions when they are released.
    pub validate_on_release: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 5,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            eviction_interval: Duration::from_secs(60),
            validate_on_release: false,
        }
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_size == 0 {
            return Err(ConfigError::Invalid {
                message: "pool max_size must be greater than 0".to_string(),
            });
        }

        if self.min_size > self.max_size {
            return Err(ConfigError::Invalid {
                message: format!(
                    "pool min_size ({}) must not exceed max_size ({})",
                    self.min_size, self.max_size
                ),
            });
        }

        if self.eviction_interval.is_zero() {
            return Err(ConfigError::Invalid {
                message: "pool eviction_interval must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`PoolConfig`].
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn min_size(mut self, size: usize) -> Self {
        self.config.min_size = size;
        self
    }

    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn eviction_interval(mut self, interval: Duration) -> Self {
        self.config.eviction_interval = interval;
        self
    }

    pub fn validate_on_release(mut self, validate: bool) -> Self {
        self.config.validate_on_release = validate;
        self
    }

    pub fn build(self) -> ConfigResult<PoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
