//! Configuration structures
//!
//! Every section deserializes with defaults, so a file only needs the keys it
//! changes. Durations are integer milliseconds under `*_ms` keys.
//! Loading from files and the environment lives in `erpshield-infra`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use erpshield_common::{duration_millis, option_duration_millis};
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::*;
use crate::errors::{Result, ShieldError};

/// Configuration for the whole resilience layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub erp_breaker: BreakerConfig,
    #[serde(deserialize_with = "vector_breaker")]
    pub vector_breaker: BreakerConfig,
    pub pool: PoolSettings,
    pub cache: CacheSettings,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            erp_breaker: BreakerConfig::erp(),
            vector_breaker: BreakerConfig::vector(),
            pool: PoolSettings::default(),
            cache: CacheSettings::default(),
            health: HealthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Check every section. The first problem found is reported.
    pub fn validate(&self) -> Result<()> {
        self.backend.validate()?;
        self.erp_breaker.validate("erp_breaker")?;
        self.vector_breaker.validate("vector_breaker")?;
        self.pool.validate()?;
        self.cache.validate()?;
        if self.health.interval_secs == 0 {
            return Err(ShieldError::config("health.interval_secs must be greater than 0"));
        }
        Ok(())
    }
}

// ===== Backend =====

/// Where the ERP lives and how long calls into it may take.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://erp.example.com`
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Deadline around an ordinary call, retries included
    #[serde(rename = "api_timeout_ms", with = "duration_millis")]
    pub api_timeout: Duration,
    /// Deadline around a batch/export call
    #[serde(rename = "batch_timeout_ms", with = "duration_millis")]
    pub batch_timeout: Duration,
    pub max_attempts: u32,
    #[serde(rename = "retry_base_delay_ms", with = "duration_millis")]
    pub retry_base_delay: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            database: String::new(),
            username: String::new(),
            password: String::new(),
            api_timeout: Duration::from_millis(DEFAULT_API_TIMEOUT_MS),
            batch_timeout: Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_timeout", &self.api_timeout)
            .field("batch_timeout", &self.batch_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay", &self.retry_base_delay)
            .finish()
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ShieldError::config(format!(
                "backend.url must be an http(s) URL, got '{}'",
                self.url
            )));
        }
        if self.database.is_empty() {
            return Err(ShieldError::config("backend.database is required"));
        }
        if self.username.is_empty() {
            return Err(ShieldError::config("backend.username is required"));
        }
        if self.api_timeout.is_zero() || self.batch_timeout.is_zero() {
            return Err(ShieldError::config("backend timeouts must be greater than 0"));
        }
        if self.max_attempts == 0 {
            return Err(ShieldError::config("backend.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

// ===== Circuit breakers =====

/// Tuning for one circuit breaker instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    #[serde(rename = "open_duration_ms", with = "duration_millis")]
    pub open_duration: Duration,
    pub half_open_probe_limit: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::erp()
    }
}

impl BreakerConfig {
    /// Breaker in front of the ERP backend.
    pub fn erp() -> Self {
        Self {
            failure_threshold: ERP_FAILURE_THRESHOLD,
            open_duration: Duration::from_millis(ERP_OPEN_DURATION_MS),
            half_open_probe_limit: DEFAULT_HALF_OPEN_PROBE_LIMIT,
        }
    }

    /// Breaker in front of the vector search service.
    pub fn vector() -> Self {
        Self {
            failure_threshold: VECTOR_FAILURE_THRESHOLD,
            open_duration: Duration::from_millis(VECTOR_OPEN_DURATION_MS),
            half_open_probe_limit: DEFAULT_HALF_OPEN_PROBE_LIMIT,
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.failure_threshold == 0 || self.half_open_probe_limit == 0 {
            return Err(ShieldError::config(format!(
                "{section}: failure_threshold and half_open_probe_limit must be at least 1"
            )));
        }
        if self.open_duration.is_zero() {
            return Err(ShieldError::config(format!("{section}.open_duration_ms must be greater than 0")));
        }
        Ok(())
    }
}

/// Partially specified breaker section, filled from the vector defaults.
#[derive(Deserialize)]
struct BreakerOverrides {
    failure_threshold: Option<u32>,
    open_duration_ms: Option<u64>,
    half_open_probe_limit: Option<u32>,
}

fn vector_breaker<'de, D>(deserializer: D) -> std::result::Result<BreakerConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BreakerOverrides::deserialize(deserializer)?;
    let defaults = BreakerConfig::vector();
    Ok(BreakerConfig {
        failure_threshold: overrides.failure_threshold.unwrap_or(defaults.failure_threshold),
        open_duration: overrides
            .open_duration_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.open_duration),
        half_open_probe_limit: overrides
            .half_open_probe_limit
            .unwrap_or(defaults.half_open_probe_limit),
    })
}

// ===== Pool =====

/// Session pool sizing and timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub min_size: usize,
    pub max_size: usize,
    #[serde(rename = "acquire_timeout_ms", with = "duration_millis")]
    pub acquire_timeout: Duration,
    /// Acquire wait for batch/export calls
    #[serde(rename = "batch_acquire_timeout_ms", with = "duration_millis")]
    pub batch_acquire_timeout: Duration,
    #[serde(rename = "idle_timeout_ms", with = "duration_millis")]
    pub idle_timeout: Duration,
    #[serde(rename = "eviction_interval_ms", with = "duration_millis")]
    pub eviction_interval: Duration,
    pub validate_on_release: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_POOL_MIN,
            max_size: DEFAULT_POOL_MAX,
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
            batch_acquire_timeout: Duration::from_millis(DEFAULT_BATCH_ACQUIRE_TIMEOUT_MS),
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            eviction_interval: Duration::from_millis(DEFAULT_EVICTION_INTERVAL_MS),
            validate_on_release: false,
        }
    }
}

impl PoolSettings {
    fn validate(&self) -> Result<()> {
        if self.max_size == 0 || self.min_size > self.max_size {
            return Err(ShieldError::config(format!(
                "pool: need 0 < max_size and min_size <= max_size, got min {} max {}",
                self.min_size, self.max_size
            )));
        }
        if self.eviction_interval.is_zero() {
            return Err(ShieldError::config("pool.eviction_interval_ms must be greater than 0"));
        }
        Ok(())
    }
}

// ===== Cache =====

/// Reference data cache sizing and per-key TTLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_size: usize,
    pub refresh_threshold_percent: u8,
    #[serde(rename = "default_ttl_ms", with = "duration_millis")]
    pub default_ttl: Duration,
    /// Serve an expired value for this long when its refetch fails.
    /// Absent means expired entries are never served.
    #[serde(rename = "stale_if_error_ms", with = "option_duration_millis")]
    pub stale_if_error: Option<Duration>,
    /// Per-key TTL in milliseconds; keys not listed use `default_ttl_ms`.
    pub ttl_ms: BTreeMap<String, u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let ttl_ms = [
            (KEY_PIPELINE_STAGES, REFERENCE_TTL_LONG_MS),
            (KEY_LOST_REASONS, REFERENCE_TTL_LONG_MS),
            (KEY_COUNTRY_STATES, REFERENCE_TTL_LONG_MS),
            (KEY_SALES_TEAMS, REFERENCE_TTL_SHORT_MS),
            (KEY_SALESPEOPLE, REFERENCE_TTL_SHORT_MS),
        ]
        .into_iter()
        .map(|(key, ms)| (key.to_string(), ms))
        .collect();

        Self {
            max_size: DEFAULT_CACHE_MAX_SIZE,
            refresh_threshold_percent: DEFAULT_REFRESH_THRESHOLD_PERCENT,
            default_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            stale_if_error: None,
            ttl_ms,
        }
    }
}

impl CacheSettings {
    /// TTL for `key`, falling back to `default_ttl`.
    pub fn ttl_for(&self, key: &str) -> Duration {
        self.ttl_ms.get(key).map_or(self.default_ttl, |ms| Duration::from_millis(*ms))
    }

    fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(ShieldError::config("cache.max_size must be greater than 0"));
        }
        if !(1..=100).contains(&self.refresh_threshold_percent) {
            return Err(ShieldError::config(format!(
                "cache.refresh_threshold_percent must be within 1..=100, got {}",
                self.refresh_threshold_percent
            )));
        }
        if let Some((key, _)) = self.ttl_ms.iter().find(|(_, ms)| **ms == 0) {
            return Err(ShieldError::config(format!("cache.ttl_ms.{key} must be greater than 0")));
        }
        Ok(())
    }
}

// ===== Health and logging =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { interval_secs: DEFAULT_HEALTH_INTERVAL_SECS }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `erpshield_infra=debug,info`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
