//! Resilience primitives shared across ERPShield crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification and serde helpers
//! - `runtime`: async building blocks (resilience, cache, pool)
//! - `test-utils`: scripted outcomes and polling helpers for tests
//! - `observability`: tracing support (pulled in by `runtime`)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod cache;
#[cfg(feature = "runtime")]
pub mod pool;
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(all(feature = "runtime", any(feature = "test-utils", test)))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use cache::{CacheConfig, CacheStats, TtlCache};
#[cfg(feature = "foundation")]
pub use error::{ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use pool::{ConnectionPool, Lease, PoolConfig, PoolError, PoolMetrics, SessionFactory};
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerMetrics, CircuitState, Clock, Jitter, MockClock, ResilienceError,
    ResilienceResult, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError, RetryExecutor,
    RetryPolicy, RetryResult, SystemClock, TimeoutError, TimeoutGuard,
};
#[cfg(feature = "foundation")]
pub use utils::serde::{duration_millis, option_duration_millis};
