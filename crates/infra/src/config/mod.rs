//! Configuration loading and management
//!
//! `loader` reads a [`Config`](erpshield_domain::Config) from environment
//! variables or files; `runtime` turns its sections into the primitive
//! configs used by the breaker, retry, pool and cache.

pub mod loader;
pub mod runtime;

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};
pub use runtime::{breaker_config, cache_config, pool_config, retry_config};
