//! Domain-level defaults
//!
//! Centralized location for the numbers the configuration falls back to.

// Backend calls
pub const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;

// Circuit breakers
pub const ERP_BREAKER_NAME: &str = "erp";
pub const ERP_FAILURE_THRESHOLD: u32 = 5;
pub const ERP_OPEN_DURATION_MS: u64 = 60_000;
pub const VECTOR_BREAKER_NAME: &str = "vector_search";
pub const VECTOR_FAILURE_THRESHOLD: u32 = 3;
pub const VECTOR_OPEN_DURATION_MS: u64 = 30_000;
pub const DEFAULT_HALF_OPEN_PROBE_LIMIT: u32 = 1;

// Connection pool
pub const DEFAULT_POOL_MIN: usize = 2;
pub const DEFAULT_POOL_MAX: usize = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_BATCH_ACQUIRE_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_EVICTION_INTERVAL_MS: u64 = 60_000;

// Cache
pub const DEFAULT_CACHE_MAX_SIZE: usize = 500;
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
pub const DEFAULT_REFRESH_THRESHOLD_PERCENT: u8 = 80;
pub const REFERENCE_TTL_LONG_MS: u64 = 30 * 60 * 1000;
pub const REFERENCE_TTL_SHORT_MS: u64 = 15 * 60 * 1000;

// Health
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 60;

// Batch export
pub const DEFAULT_PAGE_SIZE: usize = 500;

// Reference data cache keys
pub const KEY_PIPELINE_STAGES: &str = "stages";
pub const KEY_LOST_REASONS: &str = "lost_reasons";
pub const KEY_SALES_TEAMS: &str = "teams";
pub const KEY_SALESPEOPLE: &str = "salespeople";
pub const KEY_COUNTRY_STATES: &str = "states";
