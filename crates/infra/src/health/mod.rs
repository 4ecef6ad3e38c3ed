//! Backend health reporting and background monitoring

pub mod monitor;
pub mod snapshot;

pub use monitor::{HealthMonitor, HealthProbe};
pub use snapshot::circuit_health;
