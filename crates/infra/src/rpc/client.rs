//! Resilient facade over the ERP backend
//!
//! [`ResilientRpcClient`] is the one entry point analytics code uses to reach
//! the backend. Every call goes through the same stack:
//!
//! ```text
//! breaker.execute(
//!     deadline(api_timeout | batch_timeout,
//!         retry(transient only,
//!             pool.acquire → transport.execute_kw → lease.release)))
//! ```
//!
//! Reference data is served from a [`TtlCache`] of raw JSON values whose
//! fetchers re-enter the stack above, so a background refresh is circuit
//! protected like any other call.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use erpshield_common::resilience::policies::ClassifiedRetry;
use erpshield_common::{
    CacheStats, CircuitBreaker, CircuitBreakerMetrics, Clock, ConnectionPool, Lease, PoolMetrics,
    RetryExecutor, SystemClock, TimeoutGuard, TtlCache,
};
use erpshield_core::{
    warm_up_reference, BatchProgress, CacheHealth, Credentials, ErpGateway, PoolHealth, RpcCall,
    RpcTransport, SearchOptions, ShieldHealth, WarmUpReport,
};
use erpshield_domain::constants::ERP_BREAKER_NAME;
use erpshield_domain::{BackendConfig, CacheSettings, Config, Result, ShieldError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::sessions::TransportSessions;
use crate::config::runtime::{breaker_config, cache_config, pool_config, retry_config};
use crate::errors::IntoShieldError;
use crate::health::snapshot::circuit_health;

/// A pooled backend session lent to a collaborator.
pub type ErpLease<T, C = SystemClock> = Lease<TransportSessions<T>, C>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Api,
    Batch,
}

struct ClientInner<T: RpcTransport, C: Clock> {
    backend: BackendConfig,
    credentials: Credentials,
    transport: Arc<T>,
    pool: ConnectionPool<TransportSessions<T>, C>,
    batch_acquire_timeout: Duration,
    breaker: CircuitBreaker<C>,
    cache: TtlCache<String, Value, C>,
    cache_settings: CacheSettings,
    retry: RetryExecutor<ClassifiedRetry>,
    /// Backend user id; the lock makes concurrent logins single-flight.
    uid: AsyncMutex<Option<i64>>,
    authenticated: AtomicBool,
}

/// Circuit-protected, pooled, cached access to the ERP backend.
///
/// Cheap to clone; clones share every component.
pub struct ResilientRpcClient<T: RpcTransport, C: Clock = SystemClock> {
    inner: Arc<ClientInner<T, C>>,
}

impl<T: RpcTransport, C: Clock> Clone for ResilientRpcClient<T, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: RpcTransport, C: Clock> fmt::Debug for ResilientRpcClient<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientRpcClient")
            .field("backend", &self.inner.backend)
            .field("breaker", &self.inner.breaker)
            .field("pool", &self.inner.pool)
            .finish_non_exhaustive()
    }
}

impl<T: RpcTransport> ResilientRpcClient<T, SystemClock> {
    pub fn new(transport: T, config: &Config) -> Result<Self> {
        Self::with_clock(transport, config, SystemClock)
    }
}

impl<T: RpcTransport, C: Clock + Clone> ResilientRpcClient<T, C> {
    /// Build the client with every component reading time from `clock`.
    pub fn with_clock(transport: T, config: &Config, clock: C) -> Result<Self> {
        let transport = Arc::new(transport);

        let pool = ConnectionPool::with_clock(
            TransportSessions::new(Arc::clone(&transport)),
            pool_config(&config.pool)?,
            clock.clone(),
        )
        .map_err(IntoShieldError::into_shield)?;
        let breaker =
            CircuitBreaker::with_clock(breaker_config(ERP_BREAKER_NAME, &config.erp_breaker)?, clock.clone())
                .map_err(IntoShieldError::into_shield)?;
        let cache =
            TtlCache::with_clock(cache_config(&config.cache)?, clock).map_err(IntoShieldError::into_shield)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                backend: config.backend.clone(),
                credentials: Credentials::from(&config.backend),
                transport,
                pool,
                batch_acquire_timeout: config.pool.batch_acquire_timeout,
                breaker,
                cache,
                cache_settings: config.cache.clone(),
                retry: RetryExecutor::new(retry_config(&config.backend)?, ClassifiedRetry),
                uid: AsyncMutex::new(None),
                authenticated: AtomicBool::new(false),
            }),
        })
    }
}

impl<T: RpcTransport, C: Clock> ResilientRpcClient<T, C> {
    // ===== Session credential =====

    /// Log in once and cache the backend uid.
    ///
    /// Concurrent callers wait for the first login instead of starting their
    /// own.
    pub async fn authenticate(&self) -> Result<i64> {
        let mut uid = self.inner.uid.lock().await;
        if let Some(uid) = *uid {
            return Ok(uid);
        }

        let lease = self
            .inner
            .pool
            .acquire(self.inner.pool.config().acquire_timeout)
            .await
            .map_err(IntoShieldError::into_shield)?;
        let result = self.inner.transport.login(&lease, &self.inner.credentials).await;
        lease.release().await;

        let value = result?;
        *uid = Some(value);
        self.inner.authenticated.store(true, Ordering::Release);
        info!(uid = value, database = %self.inner.credentials.database, "authenticated against backend");
        Ok(value)
    }

    /// Forget the cached uid so the next call logs in again.
    pub async fn invalidate_session(&self) {
        let mut uid = self.inner.uid.lock().await;
        if uid.take().is_some() {
            self.inner.authenticated.store(false, Ordering::Release);
            info!("backend session invalidated");
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::Acquire)
    }

    // ===== Calls =====

    /// Run `call` under the API deadline.
    pub async fn execute(&self, call: RpcCall) -> Result<Value> {
        self.run(call, CallKind::Api).await
    }

    /// Run `call` under the batch deadline and batch acquire timeout.
    pub async fn execute_batch(&self, call: RpcCall) -> Result<Value> {
        self.run(call, CallKind::Batch).await
    }

    /// [`execute`](Self::execute) and decode the result.
    pub async fn execute_as<R: DeserializeOwned>(&self, call: RpcCall) -> Result<R> {
        let value = self.execute(call).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `search_read` decoded into `R`.
    pub async fn search_read<R: DeserializeOwned>(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        options: &SearchOptions,
    ) -> Result<Vec<R>> {
        self.execute_as(RpcCall::search_read(model, domain, fields, options)).await
    }

    async fn run(&self, call: RpcCall, kind: CallKind) -> Result<Value> {
        let (deadline, acquire_timeout) = match kind {
            CallKind::Api => (self.inner.backend.api_timeout, self.inner.pool.config().acquire_timeout),
            CallKind::Batch => (self.inner.backend.batch_timeout, self.inner.batch_acquire_timeout),
        };
        let guard = TimeoutGuard::new(call.label(), deadline);
        let call = Arc::new(call);

        let outcome = self
            .inner
            .breaker
            .execute(move || {
                let client = self.clone();
                async move {
                    let attempts = async move {
                        client
                            .inner
                            .retry
                            .execute(|| client.wire_call(&call, acquire_timeout))
                            .await
                            .map_err(IntoShieldError::into_shield)
                    };
                    match guard.run(attempts).await {
                        Ok(result) => result,
                        Err(elapsed) => Err(elapsed.into_shield()),
                    }
                }
            })
            .await;

        outcome.map_err(|err| {
            let err = err.into_shield();
            if err.is_circuit_open() {
                debug!(error = %err, "call rejected by open circuit");
            }
            err
        })
    }

    /// One attempt: borrow a session, run the call, hand the session back.
    async fn wire_call(&self, call: &RpcCall, acquire_timeout: Duration) -> Result<Value> {
        let uid = self.authenticate().await?;
        let lease = self.inner.pool.acquire(acquire_timeout).await.map_err(IntoShieldError::into_shield)?;
        let result = self.inner.transport.execute_kw(&lease, &self.inner.credentials, uid, call).await;
        lease.release().await;

        if let Err(err) = &result {
            if err.is_authentication() {
                warn!(label = %call.label(), "backend refused credentials, dropping session");
                self.invalidate_session().await;
            }
        }
        result
    }

    /// Page through every record matching `domain`.
    ///
    /// The total comes from `search_count`; after each page a
    /// [`BatchProgress`] is sent on `progress` if one is given. A dropped
    /// receiver does not stop the fetch.
    pub async fn fetch_all(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        page_size: usize,
        progress: Option<mpsc::Sender<BatchProgress>>,
    ) -> Result<Vec<Value>> {
        let page_size = page_size.max(1);
        let count = self.execute(RpcCall::search_count(model, domain.clone())).await?;
        let total = count
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ShieldError::serialization(format!("search_count on {model} returned {count}")))?;

        // The count is only a hint; the vector grows with what actually arrives.
        let mut records = Vec::with_capacity(total.min(page_size));
        let mut page = 0;
        while records.len() < total {
            let options = SearchOptions::page(page_size, records.len()).ordered("id asc");
            let batch = match self.execute_batch(RpcCall::search_read(model, domain.clone(), fields, &options)).await? {
                Value::Array(items) => items,
                other => {
                    return Err(ShieldError::serialization(format!(
                        "search_read on {model} returned {other} instead of a list"
                    )))
                }
            };

            let received = batch.len();
            records.extend(batch);
            page += 1;
            debug!(model, page, fetched = records.len(), total, "batch page received");

            if let Some(sender) = &progress {
                let update = BatchProgress { fetched: records.len(), total, page };
                if sender.send(update).await.is_err() {
                    debug!(model, "progress receiver dropped");
                }
            }
            if received < page_size {
                break;
            }
        }

        info!(model, fetched = records.len(), pages = page, "batch fetch finished");
        Ok(records)
    }

    // ===== Cache =====

    /// Serve `key` from the cache, calling `fetcher` when it is cold, expired
    /// or due for refresh.
    ///
    /// `ttl` defaults to the configured TTL for `key`. A stale value is
    /// returned instead of an error whenever one exists.
    pub async fn get_cached<F, Fut>(&self, key: &str, fetcher: F, ttl: Option<Duration>) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let ttl = ttl.unwrap_or_else(|| self.inner.cache_settings.ttl_for(key));
        self.inner.cache.get_with_refresh(key.to_string(), fetcher, Some(ttl), None).await
    }

    /// Drop one cached key. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.inner.cache.delete(&key.to_string());
        debug!(key, removed, "cache key invalidated");
        removed
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        info!("reference cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    // ===== Pool and breaker =====

    /// Borrow a raw session, e.g. for an export writer.
    pub async fn acquire(&self, timeout: Duration) -> Result<ErpLease<T, C>> {
        self.inner.pool.acquire(timeout).await.map_err(IntoShieldError::into_shield)
    }

    pub fn pool_metrics(&self) -> PoolMetrics {
        self.inner.pool.metrics()
    }

    pub fn reset_circuit(&self) {
        self.inner.breaker.reset();
    }

    pub fn circuit_metrics(&self) -> CircuitBreakerMetrics {
        self.inner.breaker.metrics()
    }

    // ===== Lifecycle =====

    /// Open `min_size` sessions and load every reference listing.
    ///
    /// Failures are reported, not returned: a partially warm client still
    /// serves requests.
    pub async fn warm_up(&self) -> WarmUpReport {
        let sessions_opened = match self.inner.pool.warm_up().await {
            Ok(opened) => opened,
            Err(err) => {
                warn!(error = %err, "pool warm-up failed");
                0
            }
        };

        let mut report = warm_up_reference(self).await;
        report.sessions_opened = sessions_opened;
        report
    }

    /// Probe the backend with a pooled session.
    ///
    /// Any failure drops the cached uid.
    pub async fn health_check(&self) -> Result<()> {
        let outcome = match self.inner.pool.acquire(self.inner.pool.config().acquire_timeout).await {
            Ok(lease) => {
                let alive = self.inner.transport.ping(&lease).await;
                lease.release().await;
                if alive {
                    Ok(())
                } else {
                    Err(ShieldError::transient("backend did not answer the health probe"))
                }
            }
            Err(err) => Err(err.into_shield()),
        };

        if let Err(err) = &outcome {
            warn!(error = %err, "backend health check failed");
            self.invalidate_session().await;
        }
        outcome
    }

    /// Point-in-time health of breaker, pool and cache.
    pub fn health(&self) -> ShieldHealth {
        let pool = self.inner.pool.metrics();
        let cache = self.inner.cache.stats();

        ShieldHealth {
            circuit: circuit_health(&self.inner.breaker.metrics()),
            pool: PoolHealth {
                size: pool.size,
                available: pool.available,
                borrowed: pool.borrowed,
                pending: pool.pending,
                max_size: pool.max_size,
            },
            cache: CacheHealth {
                size: cache.size,
                hits: cache.hits,
                misses: cache.misses,
                hit_rate: cache.hit_rate(),
            },
            authenticated: self.is_authenticated(),
            checked_at: Utc::now(),
        }
    }

    /// Close the pool. Idempotent.
    pub fn shutdown(&self) {
        self.inner.pool.shutdown();
    }
}

#[async_trait]
impl<T: RpcTransport, C: Clock> ErpGateway for ResilientRpcClient<T, C> {
    async fn execute(&self, call: RpcCall) -> Result<Value> {
        ResilientRpcClient::execute(self, call).await
    }

    async fn execute_batch(&self, call: RpcCall) -> Result<Value> {
        ResilientRpcClient::execute_batch(self, call).await
    }

    async fn cached_call(&self, key: &str, call: RpcCall, ttl: Option<Duration>) -> Result<Value> {
        let client = self.clone();
        self.get_cached(key, move || async move { client.execute(call).await }, ttl).await
    }

    fn health(&self) -> ShieldHealth {
        ResilientRpcClient::health(self)
    }
}
