//! # ERPShield Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The JSON-RPC transport over reqwest
//! - The resilient client facade (breaker, deadline, retry, pool, cache)
//! - Configuration loading and tracing setup
//! - The background health monitor
//! - The [`ShieldContainer`] composition root
//!
//! ## Architecture
//! - Implements traits defined in `erpshield-core`
//! - Builds on the primitives of `erpshield-common`
//! - Contains all "impure" code (network, files, environment)

pub mod config;
pub mod container;
pub mod errors;
pub mod health;
pub mod observability;
pub mod rpc;

// Re-export commonly used items
pub use container::{ContainerHealth, ContainerOptions, ShieldContainer};
pub use errors::IntoShieldError;
pub use health::{HealthMonitor, HealthProbe};
pub use observability::init_tracing;
pub use rpc::{ErpLease, JsonRpcTransport, ResilientRpcClient, RpcSession, TransportSessions};
