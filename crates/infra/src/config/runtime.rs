//! Translation of configuration sections into primitive configs.

use std::time::Duration;

use erpshield_common::{CacheConfig, CircuitBreakerConfig, PoolConfig, RetryConfig};
use erpshield_domain::constants::DEFAULT_RETRY_MAX_DELAY_MS;
use erpshield_domain::{BackendConfig, BreakerConfig, CacheSettings, PoolSettings, Result};

use crate::errors::IntoShieldError;

const BACKOFF_BASE: f64 = 2.0;

pub fn breaker_config(name: &str, settings: &BreakerConfig) -> Result<CircuitBreakerConfig> {
    CircuitBreakerConfig::builder()
        .name(name)
        .failure_threshold(settings.failure_threshold)
        .open_duration(settings.open_duration)
        .half_open_probe_limit(settings.half_open_probe_limit)
        .build()
        .map_err(IntoShieldError::into_shield)
}

/// Exponential backoff from `retry_base_delay`, capped, with equal jitter.
pub fn retry_config(backend: &BackendConfig) -> Result<RetryConfig> {
    RetryConfig::builder()
        .max_attempts(backend.max_attempts)
        .exponential_backoff(
            backend.retry_base_delay,
            BACKOFF_BASE,
            Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
        )
        .equal_jitter()
        .build()
        .map_err(IntoShieldError::into_shield)
}

pub fn pool_config(settings: &PoolSettings) -> Result<PoolConfig> {
    PoolConfig::builder()
        .min_size(settings.min_size)
        .max_size(settings.max_size)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .eviction_interval(settings.eviction_interval)
        .validate_on_release(settings.validate_on_release)
        .build()
        .map_err(IntoShieldError::into_shield)
}

pub fn cache_config(settings: &CacheSettings) -> Result<CacheConfig> {
    CacheConfig::builder()
        .max_size(settings.max_size)
        .default_ttl(settings.default_ttl)
        .refresh_threshold_percent(settings.refresh_threshold_percent)
        .stale_if_error(settings.stale_if_error)
        .build()
        .map_err(IntoShieldError::into_shield)
}
