//! Error classification shared by every layer.
//!
//! Layer-specific error enums implement [`ErrorClassification`] so that retry
//! policies, logging and health reporting can reason about failures without
//! knowing the concrete type.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Classify an error for retry and alerting decisions.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use erpshield_common::error::{ErrorClassification, ErrorSeverity};
///
/// #[derive(Debug)]
/// enum FetchError {
///     Busy,
///     Denied,
/// }
///
/// impl ErrorClassification for FetchError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, Self::Busy)
///     }
///
///     fn retry_after(&self) -> Option<Duration> {
///         matches!(self, Self::Busy).then(|| Duration::from_secs(1))
///     }
/// }
///
/// assert_eq!(FetchError::Busy.severity(), ErrorSeverity::Warning);
/// assert_eq!(FetchError::Denied.severity(), ErrorSeverity::Error);
/// ```
pub trait ErrorClassification {
    /// Whether repeating the same call may succeed.
    fn is_retryable(&self) -> bool;

    /// Severity used for log levels and alerting.
    fn severity(&self) -> ErrorSeverity {
        if self.is_retryable() {
            ErrorSeverity::Warning
        } else {
            ErrorSeverity::Error
        }
    }

    /// Whether this error needs operator attention.
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Delay suggested by the failure itself, such as a breaker cooldown.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
