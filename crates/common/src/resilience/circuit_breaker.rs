//! Tri-state circuit breaker guarding a single remote dependency.
//!
//! The breaker counts consecutive failures while `CLOSED`, rejects calls
//! outright while `OPEN`, and lets a bounded number of probe calls through
//! once the cooldown has elapsed (`HALF_OPEN`). One successful probe closes
//! the circuit again; one failed probe reopens it.
//!
//! All transitions happen inside one short critical section so that the
//! admission decision and the probe reservation cannot interleave with another
//! caller's outcome bookkeeping.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Source of monotonic time.
///
/// Production code uses [`SystemClock`]; tests drive [`MockClock`] by hand so
/// cooldowns, TTLs and idle timeouts can be crossed without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Clones share the same elapsed counter, so a test can hand one clone to the
/// component under test and keep another to move time forward.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock anchored at the current instant.
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Move time forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        *lock_recover(&self.elapsed, "mock clock") += duration;
    }

    /// Move time forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the total elapsed time since the anchor.
    pub fn set_elapsed(&self, duration: Duration) {
        *lock_recover(&self.elapsed, "mock clock") = duration;
    }

    /// Total elapsed time since the anchor.
    pub fn elapsed(&self) -> Duration {
        *lock_recover(&self.elapsed, "mock clock")
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }
}

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(lock = what, "lock poisoned, recovering inner state");
            poisoned.into_inner()
        }
    }
}

/// Round a duration up to whole seconds.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

//==============================================================================
// Error Types
//==============================================================================

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Error returned by [`CircuitBreaker::execute`].
///
/// Generic over the protected operation's error so the caller keeps the
/// original failure.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The call was rejected without running the operation.
    #[error("Circuit breaker '{name}' is open, retry after {retry_after:?}")]
    CircuitOpen { name: String, retry_after: Duration },

    /// The operation ran and failed.
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// `true` when the breaker rejected the call.
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Whole seconds until the breaker admits a probe, rounded up.
    ///
    /// `None` when the operation itself failed.
    pub fn seconds_until_retry(&self) -> Option<u64> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(ceil_secs(*retry_after)),
            Self::OperationFailed { .. } => None,
        }
    }

    /// The operation's own error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            Self::CircuitOpen { .. } => None,
        }
    }
}

/// Result type for breaker-protected operations.
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

//==============================================================================
// State & Configuration
//==============================================================================

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// A limited number of probe calls are admitted.
    HalfOpen,
}

impl CircuitState {
    /// Stable upper-case label used in logs and health output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Name used in logs and in [`ResilienceError::CircuitOpen`].
    pub name: String,
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Cooldown measured from the most recent failure.
    pub open_duration: Duration,
    /// Probe calls admitted concurrently while half-open.
    pub half_open_probe_limit: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
            half_open_probe_limit: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Start a configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Reject zero thresholds and an empty cooldown.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.half_open_probe_limit == 0 {
            return Err(ConfigError::Invalid {
                message: "half_open_probe_limit must be greater than 0".to_string(),
            });
        }

        if self.open_duration.is_zero() {
            return Err(ConfigError::Invalid {
                message: "open_duration must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.config.open_duration = duration;
        self
    }

    pub fn half_open_probe_limit(mut self, limit: u32) -> Self {
        self.config.half_open_probe_limit = limit;
        self
    }

    /// Finish with a custom clock and build the breaker directly.
    pub fn clock<C: Clock>(self, clock: C) -> CircuitBreakerBuilderWithClock<C> {
        CircuitBreakerBuilderWithClock { config: self.config, clock }
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder carrying a custom clock; builds the breaker itself.
pub struct CircuitBreakerBuilderWithClock<C: Clock> {
    config: CircuitBreakerConfig,
    clock: C,
}

impl<C: Clock> CircuitBreakerBuilderWithClock<C> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.config.open_duration = duration;
        self
    }

    pub fn half_open_probe_limit(mut self, limit: u32) -> Self {
        self.config.half_open_probe_limit = limit;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.config, self.clock)
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_in_flight: u32,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub last_failure_at: Option<Instant>,
    pub last_transition_at: Instant,
    /// Seconds (rounded up) until a probe is admitted; `Some` only while open.
    pub seconds_until_retry: Option<u64>,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    last_transition_at: Instant,
    half_open_in_flight: u32,
}

impl CircuitInner {
    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.last_transition_at = now;
        self.half_open_in_flight = 0;
    }

    fn remaining_cooldown(&self, now: Instant, open_duration: Duration) -> Duration {
        let since = self.last_failure_at.unwrap_or(self.last_transition_at);
        open_duration.saturating_sub(now.saturating_duration_since(since))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Circuit breaker for one protected backend.
///
/// Cheap to clone; clones share state.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<Mutex<CircuitInner>>,
    total_calls: Arc<AtomicU64>,
    rejected_calls: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("total_calls", &self.total_calls.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            inner: Arc::clone(&self.inner),
            total_calls: Arc::clone(&self.total_calls),
            rejected_calls: Arc::clone(&self.rejected_calls),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker on the system clock.
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Start a breaker configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker driven by `clock`.
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        let now = clock.now();
        Ok(Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                last_transition_at: now,
                half_open_in_flight: 0,
            })),
            total_calls: Arc::new(AtomicU64::new(0)),
            rejected_calls: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        })
    }

    /// Breaker name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        lock_recover(&self.inner, "circuit breaker")
    }

    /// Decide whether a call may run, reserving a probe slot when half-open.
    ///
    /// Returns the remaining cooldown on rejection.
    fn admit(&self) -> Result<Admission, Duration> {
        let now = self.clock.now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let remaining = inner.remaining_cooldown(now, self.config.open_duration);
                if remaining.is_zero() {
                    inner.transition(CircuitState::HalfOpen, now);
                    inner.half_open_in_flight = 1;
                    info!(breaker = %self.config.name, "circuit half-open, admitting probe");
                    Ok(Admission::Probe)
                } else {
                    Err(remaining)
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_probe_limit {
                    inner.half_open_in_flight += 1;
                    Ok(Admission::Probe)
                } else {
                    // Probe slots are full; the next admission depends on the
                    // outcome of the running probe, not on the clock.
                    Err(Duration::ZERO)
                }
            }
        }
    }

    /// Run `operation` under breaker protection.
    ///
    /// Rejected calls never invoke `operation`. Each admitted call records
    /// exactly one outcome.
    #[instrument(skip(self, operation), fields(breaker = %self.config.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(retry_after) => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                debug!(retry_after_ms = retry_after.as_millis() as u64, "call rejected");
                return Err(ResilienceError::CircuitOpen {
                    name: self.config.name.clone(),
                    retry_after,
                });
            }
        };

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let mut probe = ProbeSlot { breaker: self, armed: admission == Admission::Probe };

        let outcome = operation().await;
        probe.armed = false;

        match outcome {
            Ok(value) => {
                self.on_success(admission);
                Ok(value)
            }
            Err(error) => {
                self.on_failure(admission);
                debug!(error = %error, "protected operation failed");
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Record a successful call outcome.
    ///
    /// Counts as a probe result: a half-open circuit closes.
    pub fn record_success(&self) {
        self.on_success(Admission::Probe);
    }

    /// Record a failed call outcome.
    pub fn record_failure(&self) {
        self.on_failure(Admission::Probe);
    }

    fn on_success(&self, admission: Admission) {
        let now = self.clock.now();
        let mut inner = self.lock();

        match (inner.state, admission) {
            (CircuitState::Closed, _) => inner.consecutive_failures = 0,
            (CircuitState::HalfOpen, Admission::Probe) => {
                inner.transition(CircuitState::Closed, now);
                inner.consecutive_failures = 0;
                info!(breaker = %self.config.name, "circuit closed after successful probe");
            }
            (CircuitState::HalfOpen, Admission::Normal) => {
                // Only a probe decides a half-open circuit.
                debug!(breaker = %self.config.name, "late success while half-open ignored");
            }
            (CircuitState::Open, _) => {
                // A call admitted before the circuit opened finished late.
                debug!(breaker = %self.config.name, "late success while open ignored");
            }
        }
    }

    fn on_failure(&self, admission: Admission) {
        let now = self.clock.now();
        let mut inner = self.lock();

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(now);

        match (inner.state, admission) {
            (CircuitState::Closed, _) => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.transition(CircuitState::Open, now);
                    warn!(
                        breaker = %self.config.name,
                        failures = inner.consecutive_failures,
                        open_ms = self.config.open_duration.as_millis() as u64,
                        "circuit opened"
                    );
                }
            }
            (CircuitState::HalfOpen, Admission::Probe) => {
                inner.transition(CircuitState::Open, now);
                warn!(breaker = %self.config.name, "probe failed, circuit reopened");
            }
            (CircuitState::HalfOpen, Admission::Normal) | (CircuitState::Open, _) => {}
        }
    }

    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.half_open_in_flight > 0 {
            inner.half_open_in_flight -= 1;
            debug!(breaker = %self.config.name, "abandoned probe released its slot");
        }
    }

    /// Stored state. An open circuit whose cooldown has elapsed still reports
    /// `Open` until the next call is admitted.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failures counted so far.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Snapshot of the breaker for health reporting.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let now = self.clock.now();
        let inner = self.lock();
        let seconds_until_retry = (inner.state == CircuitState::Open)
            .then(|| ceil_secs(inner.remaining_cooldown(now, self.config.open_duration)));

        CircuitBreakerMetrics {
            name: self.config.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_in_flight: inner.half_open_in_flight,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            last_failure_at: inner.last_failure_at,
            last_transition_at: inner.last_transition_at,
            seconds_until_retry,
        }
    }

    /// Force the circuit closed and forget recorded failures.
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.transition(CircuitState::Closed, now);
        inner.consecutive_failures = 0;
        inner.last_failure_at = None;
        info!(breaker = %self.config.name, "circuit breaker manually reset to closed state");
    }
}

/// Gives a probe slot back if the caller drops the future mid-flight.
struct ProbeSlot<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    armed: bool,
}

impl<C: Clock> Drop for ProbeSlot<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}
