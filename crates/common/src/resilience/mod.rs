//! Resilience patterns for calls into slow or unreliable backends
//!
//! This module provides **generic, reusable** building blocks:
//! - **Circuit Breaker**: stops calling a failing dependency for a cooldown
//!   period, then probes it
//! - **Retry Logic**: re-invokes an operation while its error is classified as
//!   transient, with backoff and jitter
//! - **Timeout Guard**: bounds how long a caller waits for an operation
//!
//! They compose from the outside in as
//! `breaker.execute(|| guard.run(retry.execute(op)))`: one deadline covers the
//! whole retry sequence, and the breaker sees a single outcome per call.
//!
//! | Pattern | Fails with | Counts toward breaker |
//! |---------|------------|-----------------------|
//! | `CircuitBreaker` | `ResilienceError::CircuitOpen` | n/a |
//! | `TimeoutGuard` | `TimeoutError::Elapsed` | yes |
//! | `RetryExecutor` | `RetryError::{Exhausted, NonRetryable}` | yes |
//!
//! All types are generic over the error type and testable with [`MockClock`]
//! or a paused tokio clock.

pub mod circuit_breaker;
pub mod retry;
pub mod timeout;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState, Clock, ConfigError, ConfigResult, MockClock, ResilienceError, ResilienceResult,
    SystemClock,
};
// Re-export retry types
pub use retry::{
    policies, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryPolicy, RetryResult,
};
// Re-export timeout types
pub use timeout::{TimeoutError, TimeoutGuard};
