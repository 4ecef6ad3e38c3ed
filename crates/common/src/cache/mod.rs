//! In-memory TTL cache with stale-while-revalidate refresh
//!
//! [`TtlCache`] keeps reference data close to the caller so that slow backend
//! lookups are paid once per TTL rather than once per request.
//!
//! # Features
//!
//! - **Bounded**: least-recently-used eviction once `max_size` is reached
//! - **Per-key TTL**: each entry carries its own time-to-live
//! - **Stale-while-revalidate**: reads late in an entry's life return at once
//!   and refresh in the background
//! - **Single-flight**: concurrent cold reads of one key share one fetch
//! - **Metrics**: hit/miss/eviction/refresh counters via [`CacheStats`]
//! - **Testable**: clock abstraction for deterministic time-based testing
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use erpshield_common::cache::{CacheConfig, TtlCache};
//!
//! let config = CacheConfig::builder()
//!     .max_size(500)
//!     .default_ttl(Duration::from_secs(1800))
//!     .refresh_threshold_percent(80)
//!     .build()
//!     .unwrap();
//!
//! let cache: TtlCache<String, Vec<u8>> = TtlCache::new(config).unwrap();
//! cache.set("stages".to_string(), vec![1, 2, 3]);
//! assert_eq!(cache.get(&"stages".to_string()), Some(vec![1, 2, 3]));
//! println!("Hit rate: {:.2}%", cache.stats().hit_rate() * 100.0);
//! ```
//!
//! # Thread Safety
//!
//! State sits behind a `parking_lot::Mutex` that is never held across an
//! await, so lookups, in-flight bookkeeping and LRU updates are atomic with
//! respect to each other.

mod config;
mod stats;
mod ttl;

// Re-export public API
pub use config::{CacheConfig, CacheConfigBuilder, DEFAULT_REFRESH_THRESHOLD_PERCENT};
pub use stats::CacheStats;
pub use ttl::TtlCache;
