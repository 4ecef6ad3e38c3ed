//! Error types used throughout ERPShield

use std::time::Duration;

use erpshield_common::error::{ErrorClassification, ErrorSeverity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for ERPShield
///
/// Every failure that leaves the resilience layer is one of these. Only
/// [`ShieldError::Transient`] is retried; the other variants go straight to
/// breaker accounting and to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum ShieldError {
    /// Connection failure, 5xx or rate limit: the same call may succeed.
    #[error("Transient backend failure: {message}")]
    Transient { message: String },

    /// The deadline passed. The remote side effect, if any, is unknown.
    #[error("Operation '{label}' timed out after {timeout_ms} ms")]
    Timeout { label: String, timeout_ms: u64 },

    /// Rejected by an open circuit breaker without contacting the backend.
    #[error("Circuit breaker '{breaker}' is open, retry in {seconds_until_retry} s")]
    CircuitOpen { breaker: String, seconds_until_retry: u64 },

    /// The backend is reachable but every pooled session is busy.
    #[error("No pooled session available after {waited_ms} ms ({pending} callers still waiting)")]
    PoolAcquireTimeout { waited_ms: u64, pending: usize },

    /// The backend refused the call; repeating it will not help.
    #[error("Backend rejected the call: {message}")]
    Permanent { message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Connection pool is shut down")]
    PoolClosed,

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ShieldError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent { message: message.into() }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication { message: message.into() }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn timeout(label: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout { label: label.into(), timeout_ms: timeout.as_millis() as u64 }
    }

    /// Only transient transport failures are worth repeating.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Seconds until an open breaker admits a probe.
    pub const fn seconds_until_retry(&self) -> Option<u64> {
        match self {
            Self::CircuitOpen { seconds_until_retry, .. } => Some(*seconds_until_retry),
            _ => None,
        }
    }
}

impl ErrorClassification for ShieldError {
    fn is_retryable(&self) -> bool {
        ShieldError::is_retryable(self)
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Transient { .. }
            | Self::Timeout { .. }
            | Self::CircuitOpen { .. }
            | Self::PoolAcquireTimeout { .. } => ErrorSeverity::Warning,
            Self::Permanent { .. }
            | Self::Authentication { .. }
            | Self::PoolClosed
            | Self::Serialization { .. }
            | Self::Config { .. } => ErrorSeverity::Error,
            Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.seconds_until_retry().map(Duration::from_secs)
    }
}

impl From<serde_json::Error> for ShieldError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type alias for ERPShield operations
pub type Result<T> = std::result::Result<T, ShieldError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates that only transient failures are retryable.
    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ShieldError::transient("connection reset").is_retryable());

        for err in [
            ShieldError::timeout("stages", Duration::from_secs(30)),
            ShieldError::CircuitOpen { breaker: "erp".into(), seconds_until_retry: 12 },
            ShieldError::PoolAcquireTimeout { waited_ms: 10_000, pending: 3 },
            ShieldError::permanent("no such model"),
            ShieldError::authentication("access denied"),
            ShieldError::PoolClosed,
            ShieldError::serialization("bad json"),
        ] {
            assert!(!err.is_retryable(), "{err} must not be retried");
        }
    }

    #[test]
    fn test_circuit_open_suggests_retry_delay() {
        let err = ShieldError::CircuitOpen { breaker: "erp".into(), seconds_until_retry: 42 };
        assert_eq!(err.seconds_until_retry(), Some(42));
        assert_eq!(ErrorClassification::retry_after(&err), Some(Duration::from_secs(42)));
        assert_eq!(err.to_string(), "Circuit breaker 'erp' is open, retry in 42 s");
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_serialized_shape_is_tagged() {
        let json = serde_json::to_value(ShieldError::timeout("teams", Duration::from_millis(1500))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "timeout", "details": {"label": "teams", "timeout_ms": 1500}})
        );

        let back: ShieldError = serde_json::from_value(json).unwrap();
        assert!(matches!(back, ShieldError::Timeout { timeout_ms: 1500, .. }));
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let err: ShieldError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ShieldError::Serialization { .. }));
    }
}
