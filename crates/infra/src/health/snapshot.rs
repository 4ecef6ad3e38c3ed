//! Conversion of primitive metrics into health report types.

use erpshield_common::CircuitBreakerMetrics;
use erpshield_core::CircuitHealth;

pub fn circuit_health(metrics: &CircuitBreakerMetrics) -> CircuitHealth {
    CircuitHealth {
        name: metrics.name.clone(),
        state: metrics.state.as_str().to_string(),
        consecutive_failures: metrics.consecutive_failures,
        seconds_until_retry: metrics.seconds_until_retry,
    }
}
