//! Deadlines for remote operations.
//!
//! [`TimeoutGuard::run`] spawns the operation and stops waiting when the
//! deadline passes. The spawned task keeps running to completion in the
//! background and its result is dropped, which matches what the remote side
//! does anyway: a request already on the wire cannot be recalled.
//!
//! [`TimeoutGuard::race`] is the in-place variant for futures that are not
//! `'static`; those are cancelled by drop when the deadline wins.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Failure of a guarded operation to produce a value in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutError {
    /// The deadline passed first.
    #[error("'{label}' timed out after {timeout:?}")]
    Elapsed { label: String, timeout: Duration },

    /// The spawned task panicked or was aborted by the runtime.
    #[error("'{label}' aborted: {message}")]
    Aborted { label: String, message: String },
}

impl TimeoutError {
    /// Label of the guarded operation.
    pub fn label(&self) -> &str {
        match self {
            Self::Elapsed { label, .. } | Self::Aborted { label, .. } => label,
        }
    }
}

/// Races one operation against a deadline.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    label: String,
    timeout: Duration,
}

impl TimeoutGuard {
    /// Guard operations labelled `label` with `timeout`.
    pub fn new(label: impl Into<String>, timeout: Duration) -> Self {
        Self { label: label.into(), timeout }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn elapsed(&self) -> TimeoutError {
        TimeoutError::Elapsed { label: self.label.clone(), timeout: self.timeout }
    }

    /// Spawn `operation` and wait for it at most `timeout`.
    ///
    /// On timeout the operation is detached, not cancelled.
    pub async fn run<F, T>(&self, operation: F) -> Result<T, TimeoutError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(operation);

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(join_error)) => {
                warn!(label = %self.label, error = %join_error, "guarded task aborted");
                Err(TimeoutError::Aborted {
                    label: self.label.clone(),
                    message: join_error.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    label = %self.label,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "deadline elapsed, detaching operation"
                );
                Err(self.elapsed())
            }
        }
    }

    /// Poll `operation` in place and drop it if the deadline wins.
    pub async fn race<F, T>(&self, operation: F) -> Result<T, TimeoutError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.timeout, operation).await.map_err(|_| {
            debug!(label = %self.label, "deadline elapsed, operation dropped");
            self.elapsed()
        })
    }
}
