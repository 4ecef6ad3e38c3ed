//! Backend health as seen by the periodic health check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_status_strings;

/// Overall state of the backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No check has completed yet.
    #[default]
    Unknown,
    Healthy,
    /// Reachable, but the breaker is not closed.
    Degraded,
    Unhealthy,
}

impl_status_strings!(HealthStatus {
    Unknown => "unknown",
    Healthy => "healthy",
    Degraded => "degraded",
    Unhealthy => "unhealthy",
});

impl HealthStatus {
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// A change of [`HealthStatus`], published by the health monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthTransition {
    pub from: HealthStatus,
    pub to: HealthStatus,
    pub at: DateTime<Utc>,
    /// Error text of the failed check, if it failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HealthTransition {
    pub fn initial() -> Self {
        Self { from: HealthStatus::Unknown, to: HealthStatus::Unknown, at: Utc::now(), reason: None }
    }
}
