//! In-memory TTL cache with stale-while-revalidate refresh.
//!
//! Reads fall into one of four windows depending on the entry's age:
//!
//! | Age | Behaviour |
//! |-----|-----------|
//! | absent | fetch, store, return (caller waits) |
//! | `< ttl * threshold` | return cached value |
//! | `[ttl * threshold, ttl)` | return cached value, refresh in the background |
//! | `>= ttl` | same as absent |
//!
//! Concurrent cold reads of one key share a single fetch. At most one
//! background refresh runs per key. The LRU bound is enforced by
//! [`lru::LruCache`]; every hit counts as a use.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::config::{refresh_after, CacheConfig};
use super::stats::{CacheStats, MetricsCollector};
use crate::resilience::{Clock, ConfigResult, SystemClock};

/// Type-erased fetch error handed to coalesced waiters.
type SharedError = Arc<dyn Any + Send + Sync>;

enum LoadOutcome<V> {
    Loaded(V),
    Failed(SharedError),
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
    refresh_in_flight: bool,
    generation: u64,
}

impl<V> CacheEntry<V> {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

struct CacheState<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    loading: HashMap<K, Vec<oneshot::Sender<LoadOutcome<V>>>>,
    next_generation: u64,
}

impl<K: Hash + Eq, V> CacheState<K, V> {
    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

struct Shared<K: Hash + Eq, V, C> {
    config: CacheConfig,
    state: Mutex<CacheState<K, V>>,
    metrics: MetricsCollector,
    clock: C,
}

enum Lookup<V> {
    Fresh(V),
    Stale { value: V, generation: u64 },
    Wait(oneshot::Receiver<LoadOutcome<V>>),
    Load { fallback: Option<V> },
}

/// Bounded TTL cache with single-flight loads and background refresh.
///
/// Cloning is cheap; clones share storage and metrics.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use erpshield_common::cache::{CacheConfig, TtlCache};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: TtlCache<String, u32> =
///     TtlCache::new(CacheConfig::ttl_lru(Duration::from_secs(60), 100)).unwrap();
///
/// let value = cache
///     .get_with_refresh("answer".to_string(), || async { Ok::<_, String>(42) }, None, None)
///     .await;
/// assert_eq!(value, Ok(42));
/// # }
/// ```
pub struct TtlCache<K, V, C = SystemClock>
where
    K: Hash + Eq,
{
    shared: Arc<Shared<K, V, C>>,
}

impl<K: Hash + Eq, V, C> Clone for TtlCache<K, V, C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<K: Hash + Eq, V, C> fmt::Debug for TtlCache<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.shared.config)
            .field("len", &self.shared.state.lock().entries.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> TtlCache<K, V, SystemClock>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache on the system clock.
    pub fn new(config: CacheConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> TtlCache<K, V, C>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: Clock,
{
    /// Create a cache driven by `clock`.
    pub fn with_clock(config: CacheConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.max_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(CacheState {
                    entries: LruCache::new(capacity),
                    loading: HashMap::new(),
                    next_generation: 0,
                }),
                metrics: MetricsCollector::default(),
                clock,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Return the value for `key` if it has not expired.
    ///
    /// Expired entries are removed. Does not refresh.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.shared.clock.now();
        let mut state = self.shared.state.lock();

        let expired = match state.entries.get(key) {
            Some(entry) if entry.age(now) < entry.ttl => {
                self.shared.metrics.record_hit();
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.pop(key);
            self.shared.metrics.record_expiration();
        }
        self.shared.metrics.record_miss();
        None
    }

    /// Store `value` with the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.shared.config.default_ttl);
    }

    /// Store `value` with an explicit TTL.
    ///
    /// Supersedes any background refresh in flight for the key.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let now = self.shared.clock.now();
        let mut state = self.shared.state.lock();
        self.store(&mut state, key, value, ttl, now);
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &K) -> bool {
        self.shared.state.lock().entries.pop(key).is_some()
    }

    /// Remove every entry. Metrics are kept.
    pub fn clear(&self) {
        self.shared.state.lock().entries.clear();
    }

    /// Whether `key` holds an unexpired value. Does not count as a use.
    pub fn contains_key(&self, key: &K) -> bool {
        let now = self.shared.clock.now();
        self.shared.state.lock().entries.peek(key).is_some_and(|entry| entry.age(now) < entry.ttl)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries that are past their TTL and any stale-if-error grace.
    ///
    /// Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.shared.clock.now();
        let grace = self.shared.config.stale_if_error.unwrap_or(Duration::ZERO);
        let mut state = self.shared.state.lock();

        let dead: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.age(now) >= entry.ttl + grace)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &dead {
            state.entries.pop(key);
            self.shared.metrics.record_expiration();
        }
        dead.len()
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.len();
        self.shared.metrics.snapshot(size, self.shared.config.max_size)
    }

    pub fn reset_stats(&self) {
        self.shared.metrics.reset();
    }

    /// Return the cached value for `key`, fetching or refreshing as needed.
    ///
    /// `ttl` and `refresh_threshold_percent` fall back to the cache
    /// configuration when `None`. A cold or expired key waits for `fetcher`
    /// and propagates its error; a stale key returns immediately and refreshes
    /// in the background, logging and discarding a failed refresh.
    pub async fn get_with_refresh<F, Fut, E>(
        &self,
        key: K,
        fetcher: F,
        ttl: Option<Duration>,
        refresh_threshold_percent: Option<u8>,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Clone + fmt::Display + Send + Sync + 'static,
    {
        let ttl = ttl.unwrap_or(self.shared.config.default_ttl);
        let threshold =
            refresh_threshold_percent.unwrap_or(self.shared.config.refresh_threshold_percent);

        loop {
            match self.lookup(&key, threshold) {
                Lookup::Fresh(value) => {
                    debug!(key = ?key, "cache hit");
                    return Ok(value);
                }
                Lookup::Stale { value, generation } => {
                    debug!(key = ?key, "cache hit in refresh window, refreshing in background");
                    self.spawn_refresh(key, generation, ttl, fetcher);
                    return Ok(value);
                }
                Lookup::Wait(receiver) => match receiver.await {
                    Ok(LoadOutcome::Loaded(value)) => return Ok(value),
                    Ok(LoadOutcome::Failed(error)) => {
                        if let Some(error) = error.downcast_ref::<E>() {
                            return Err(error.clone());
                        }
                        debug!(key = ?key, "coalesced fetch failed with a foreign error type");
                    }
                    Err(_) => debug!(key = ?key, "leading fetch abandoned, retrying lookup"),
                },
                Lookup::Load { fallback } => return self.load(key, ttl, fallback, fetcher).await,
            }
        }
    }

    /// Classify a read under the lock, reserving whatever work it implies.
    fn lookup(&self, key: &K, threshold: u8) -> Lookup<V> {
        let now = self.shared.clock.now();
        let grace = self.shared.config.stale_if_error;
        let metrics = &self.shared.metrics;
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        let expired = match state.entries.get_mut(key) {
            Some(entry) if entry.age(now) < entry.ttl => {
                metrics.record_hit();
                let stale = entry.age(now) >= refresh_after(entry.ttl, threshold);
                if stale && !entry.refresh_in_flight {
                    entry.refresh_in_flight = true;
                    return Lookup::Stale {
                        value: entry.value.clone(),
                        generation: entry.generation,
                    };
                }
                return Lookup::Fresh(entry.value.clone());
            }
            Some(entry) => {
                let usable = grace.is_some_and(|grace| entry.age(now) < entry.ttl + grace);
                Some(usable.then(|| entry.value.clone()))
            }
            None => None,
        };

        if let Some(waiters) = state.loading.get_mut(key) {
            let (sender, receiver) = oneshot::channel();
            waiters.push(sender);
            metrics.record_coalesced();
            return Lookup::Wait(receiver);
        }

        let fallback = match expired {
            Some(fallback) => {
                metrics.record_expiration();
                if fallback.is_none() {
                    state.entries.pop(key);
                }
                fallback
            }
            None => None,
        };

        state.loading.insert(key.clone(), Vec::new());
        metrics.record_miss();
        Lookup::Load { fallback }
    }

    async fn load<F, Fut, E>(
        &self,
        key: K,
        ttl: Duration,
        fallback: Option<V>,
        fetcher: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Clone + fmt::Display + Send + Sync + 'static,
    {
        let pending = PendingLoad { shared: &self.shared, key: &key, armed: true };
        let result = fetcher().await;
        pending.disarm();

        let now = self.shared.clock.now();
        let mut state = self.shared.state.lock();
        let waiters = state.loading.remove(&key).unwrap_or_default();

        let outcome = match result {
            Ok(value) => {
                self.store(&mut state, key, value.clone(), ttl, now);
                Ok(value)
            }
            Err(error) => match fallback {
                Some(stale) => {
                    warn!(
                        key = ?key,
                        error = %error,
                        "reload failed, serving expired value inside stale-if-error window"
                    );
                    Ok(stale)
                }
                None => Err(error),
            },
        };
        drop(state);

        match &outcome {
            Ok(value) => {
                for waiter in waiters {
                    let _ = waiter.send(LoadOutcome::Loaded(value.clone()));
                }
            }
            Err(error) => {
                let shared: SharedError = Arc::new(error.clone());
                for waiter in waiters {
                    let _ = waiter.send(LoadOutcome::Failed(Arc::clone(&shared)));
                }
            }
        }
        outcome
    }

    fn spawn_refresh<F, Fut, E>(&self, key: K, generation: u64, ttl: Duration, fetcher: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let cache = self.clone();
        tokio::spawn(async move {
            let result = fetcher().await;
            cache.finish_refresh(&key, generation, ttl, result);
        });
    }

    fn finish_refresh<E: fmt::Display>(
        &self,
        key: &K,
        generation: u64,
        ttl: Duration,
        result: Result<V, E>,
    ) {
        let now = self.shared.clock.now();
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let next_generation = state.bump_generation();

        // peek_mut leaves LRU order untouched.
        let Some(entry) = state.entries.peek_mut(key) else {
            debug!(key = ?key, "entry removed while refreshing, result discarded");
            return;
        };
        if entry.generation != generation {
            debug!(key = ?key, "entry replaced while refreshing, result discarded");
            return;
        }

        match result {
            Ok(value) => {
                entry.value = value;
                entry.created_at = now;
                entry.ttl = ttl;
                entry.generation = next_generation;
                entry.refresh_in_flight = false;
                self.shared.metrics.record_refresh();
                debug!(key = ?key, "background refresh stored");
            }
            Err(error) => {
                entry.refresh_in_flight = false;
                self.shared.metrics.record_refresh_failure();
                warn!(key = ?key, error = %error, "background refresh failed, keeping stale value");
            }
        }
    }

    fn store(&self, state: &mut CacheState<K, V>, key: K, value: V, ttl: Duration, now: Instant) {
        let generation = state.bump_generation();
        let entry = CacheEntry { value, created_at: now, ttl, refresh_in_flight: false, generation };

        if let Some((evicted, _)) = state.entries.push(key.clone(), entry) {
            if evicted != key {
                self.shared.metrics.record_eviction();
                debug!(key = ?evicted, "evicted least recently used entry");
            }
        }
        self.shared.metrics.record_insert();
    }
}

/// Clears the single-flight slot if the leading caller is dropped mid-fetch.
/// Waiters see their sender dropped and retry the lookup.
struct PendingLoad<'a, K: Hash + Eq, V, C> {
    shared: &'a Shared<K, V, C>,
    key: &'a K,
    armed: bool,
}

impl<K: Hash + Eq, V, C> PendingLoad<'_, K, V, C> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<K: Hash + Eq, V, C> Drop for PendingLoad<'_, K, V, C> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.state.lock().loading.remove(self.key);
        }
    }
}
