//! Health snapshot of the resilience layer.

use chrono::{DateTime, Utc};
use erpshield_domain::HealthStatus;
use serde::{Deserialize, Serialize};

/// State of one circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitHealth {
    pub name: String,
    /// `CLOSED`, `OPEN` or `HALF_OPEN`
    pub state: String,
    pub consecutive_failures: u32,
    /// Present only while the circuit is open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_until_retry: Option<u64>,
}

impl CircuitHealth {
    pub fn status(&self) -> HealthStatus {
        match self.state.as_str() {
            "CLOSED" => HealthStatus::Healthy,
            "HALF_OPEN" => HealthStatus::Degraded,
            "OPEN" => HealthStatus::Unhealthy,
            _ => HealthStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolHealth {
    pub size: usize,
    pub available: usize,
    pub borrowed: usize,
    /// Callers queued for a session
    pub pending: usize,
    pub max_size: usize,
}

impl PoolHealth {
    /// Every session is borrowed and callers are waiting.
    pub const fn is_saturated(&self) -> bool {
        self.pending > 0 && self.borrowed >= self.max_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheHealth {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Fraction of lookups served from the cache, 0.0 to 1.0
    pub hit_rate: f64,
}

/// Combined health report returned by [`crate::ErpGateway::health`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldHealth {
    pub circuit: CircuitHealth,
    pub pool: PoolHealth,
    pub cache: CacheHealth,
    /// Whether a backend uid is currently held
    pub authenticated: bool,
    pub checked_at: DateTime<Utc>,
}

impl ShieldHealth {
    /// Overall status derived from the breaker, downgraded to `Degraded`
    /// when the pool is saturated.
    pub fn status(&self) -> HealthStatus {
        match self.circuit.status() {
            HealthStatus::Healthy if self.pool.is_saturated() => HealthStatus::Degraded,
            status => status,
        }
    }
}
