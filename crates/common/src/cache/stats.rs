//! Cache statistics and metrics tracking
//!
//! Counters are monotonic until [`TtlCache::reset_stats`](super::TtlCache::reset_stats)
//! is called.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Current number of entries
    pub size: usize,

    /// Maximum allowed entries
    pub max_size: usize,

    /// Calls answered from the cache without invoking a fetcher
    pub hits: u64,

    /// Cold or expired lookups that required a fetch
    pub misses: u64,

    /// Callers that waited on another caller's in-flight fetch
    pub coalesced: u64,

    /// Values written, by `set` or by a completed fetch
    pub inserts: u64,

    /// Entries dropped by the LRU bound
    pub evictions: u64,

    /// Entries found past their TTL
    pub expirations: u64,

    /// Background refreshes that replaced a value
    pub refreshes: u64,

    /// Background refreshes that failed and left the stale value in place
    pub refresh_failures: u64,
}

impl CacheStats {
    /// Hits over hits plus misses; `0.0` before any access.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// `size / max_size` as a fraction.
    pub fn fill_percentage(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.size as f64 / self.max_size as f64
        }
    }
}

/// Lock-free counters shared by every clone of a cache.
#[derive(Debug, Clone, Default)]
pub(crate) struct MetricsCollector {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    coalesced: Arc<AtomicU64>,
    inserts: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
    expirations: Arc<AtomicU64>,
    refreshes: Arc<AtomicU64>,
    refresh_failures: Arc<AtomicU64>,
}

impl MetricsCollector {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, size: usize, max_size: usize) -> CacheStats {
        CacheStats {
            size,
            max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.coalesced,
            &self.inserts,
            &self.evictions,
            &self.expirations,
            &self.refreshes,
            &self.refresh_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
