//! # ERPShield Core
//!
//! Ports and backend-independent logic of the resilience layer.
//!
//! This crate contains:
//! - Port interfaces: [`RpcTransport`] (wire protocol), [`ErpGateway`]
//!   (resilient execution surface)
//! - The reference data catalogue and [`ReferenceData`] accessors built on
//!   any gateway
//! - Health snapshot types
//!
//! ## Architecture Principles
//! - Only depends on `erpshield-domain`
//! - No HTTP, no runtime: implementations live in `erpshield-infra`

pub mod health;
pub mod reference;
pub mod rpc;

// Re-export specific items to avoid ambiguity
pub use health::{CacheHealth, CircuitHealth, PoolHealth, ShieldHealth};
pub use reference::{warm_up_reference, ReferenceData, ReferenceKey, WarmUpFailure, WarmUpReport};
pub use rpc::call::{BatchProgress, RpcCall, SearchOptions};
pub use rpc::ports::{Credentials, ErpGateway, RpcTransport};
