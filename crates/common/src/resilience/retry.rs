//! Retry with backoff for operations that fail transiently.
//!
//! A [`RetryPolicy`] classifies each error; the [`RetryExecutor`] re-invokes
//! the operation while the policy says so and attempts remain. Whatever
//! happens, the caller gets the last error the operation produced, never a
//! synthetic one.
//!
//! Deadlines are not handled here. Wrap the executor in a
//! [`TimeoutGuard`](super::timeout::TimeoutGuard) to bound the whole sequence.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::circuit_breaker::{ConfigError, ConfigResult};

/// Terminal outcome of a failed retry sequence.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("All {attempts} retry attempts exhausted: {source}")]
    Exhausted { attempts: u32, source: E },

    /// The policy refused to retry this error.
    #[error("Operation failed with non-retryable error after {attempts} attempt(s): {source}")]
    NonRetryable { attempts: u32, source: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::NonRetryable { attempts, .. } => *attempts,
        }
    }

    /// The last error returned by the operation.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => source,
        }
    }
}

/// Result type for retried operations.
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Classifies errors as retryable.
pub trait RetryPolicy<E> {
    /// Decide what to do after `error` on zero-based `attempt`.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision returned by a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the configured backoff.
    Retry,
    /// Retry after exactly this delay.
    RetryAfter(Duration),
    /// Give up and surface the error.
    Stop,
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Same delay every time.
    Fixed(Duration),
    /// `initial_delay + attempt * increment`.
    Linear { initial_delay: Duration, increment: Duration },
    /// `initial_delay * base^attempt`, capped at `max_delay`.
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Delay before the retry that follows zero-based `attempt`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Linear { initial_delay, increment } => {
                initial_delay.saturating_add(increment.saturating_mul(attempt))
            }
            Self::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let millis = initial_delay.as_millis() as f64 * base.powi(exponent);
                let capped = millis.min(max_delay.as_millis() as f64);
                Duration::from_millis(capped as u64)
            }
        }
    }
}

/// Randomisation applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Use the backoff delay as-is.
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Uniform in `[delay / 2, delay]`.
    Equal,
}

impl Jitter {
    /// Apply jitter to `delay`.
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(random_up_to(millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + random_up_to(millis - half))
            }
        }
    }
}

fn random_up_to(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}

/// Retry tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(200),
                base: 2.0,
                max_delay: Duration::from_secs(5),
            },
            jitter: Jitter::Equal,
        }
    }
}

impl RetryConfig {
    /// Start a configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        if let BackoffStrategy::Exponential { base, .. } = &self.backoff {
            if *base <= 0.0 {
                return Err(ConfigError::Invalid {
                    message: "exponential base must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Builder for [`RetryConfig`].
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn linear_backoff(mut self, initial_delay: Duration, increment: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Linear { initial_delay, increment };
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Jitter::None;
        self
    }

    pub fn full_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Full;
        self
    }

    pub fn equal_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Equal;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Runs an operation until it succeeds, the policy stops, or attempts run out.
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    pub const fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying according to the policy.
    #[instrument(skip(self, operation), fields(max_attempts = self.config.max_attempts))]
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let attempts = attempt + 1;
            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!(attempts, error = %error, "error is not retryable");
                    return Err(RetryError::NonRetryable { attempts, source: error });
                }
                _ if attempts >= max_attempts => {
                    warn!(attempts, error = %error, "retry attempts exhausted");
                    return Err(RetryError::Exhausted { attempts, source: error });
                }
                RetryDecision::Retry => {
                    self.config.jitter.apply(self.config.backoff.calculate_delay(attempt))
                }
                RetryDecision::RetryAfter(delay) => delay,
            };

            warn!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Pre-defined retry policies.
pub mod policies {
    use super::{RetryDecision, RetryPolicy};
    use crate::error::ErrorClassification;

    /// Retries errors that classify themselves as retryable, honouring any
    /// delay they suggest.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ClassifiedRetry;

    impl<E: ErrorClassification> RetryPolicy<E> for ClassifiedRetry {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if !error.is_retryable() {
                return RetryDecision::Stop;
            }
            match error.retry_after() {
                Some(delay) => RetryDecision::RetryAfter(delay),
                None => RetryDecision::Retry,
            }
        }
    }

    /// Retries every error.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retries.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Retries when the predicate returns `true`.
    #[derive(Debug, Clone, Copy)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub const fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E, u32) -> bool,
    {
        fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
            if (self.predicate)(error, attempt) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}
