//! # ERPShield Domain
//!
//! Domain types shared by every ERPShield crate.
//!
//! This crate contains:
//! - The error taxonomy ([`ShieldError`]) and `Result` alias
//! - Configuration structures ([`Config`] and its sections)
//! - Typed reference records decoded from the backend
//! - Domain constants and defaults
//!
//! ## Architecture
//! - Depends only on the foundation tier of `erpshield-common`
//! - No I/O, no async runtime

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
