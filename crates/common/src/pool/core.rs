//! Pool bookkeeping, acquisition and the background evictor.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::PoolConfig;
use super::lease::Lease;
use super::{PoolError, SessionFactory};
use crate::resilience::circuit_breaker::lock_recover;
use crate::resilience::{Clock, ConfigResult, SystemClock};

// ===== Resources =====

/// Lifecycle of a pooled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceState {
    Idle,
    Borrowed,
    Validating,
    Destroyed,
}

/// A session plus the pool's bookkeeping about it.
#[derive(Debug)]
pub(crate) struct Resource<S> {
    pub(crate) id: u64,
    pub(crate) session: S,
    pub(crate) state: ResourceState,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
}

struct Waiter<S> {
    id: u64,
    sender: oneshot::Sender<Resource<S>>,
}

struct PoolState<S> {
    /// Oldest at the front; reuse pops from the back, eviction from the front.
    idle: VecDeque<Resource<S>>,
    borrowed: usize,
    validating: usize,
    creating: usize,
    waiters: VecDeque<Waiter<S>>,
    next_waiter_id: u64,
    closed: bool,
    created: u64,
    destroyed: u64,
}

impl<S> PoolState<S> {
    fn total(&self) -> usize {
        self.idle.len() + self.borrowed + self.validating + self.creating
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolMetrics {
    /// Live sessions plus creations in flight
    pub size: usize,
    pub available: usize,
    pub borrowed: usize,
    pub validating: usize,
    pub creating: usize,
    /// Callers queued for a session
    pub pending: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub created: u64,
    pub destroyed: u64,
    pub acquired: u64,
    pub timeouts: u64,
    pub closed: bool,
}

// ===== Shared state =====

pub(crate) struct PoolInner<F: SessionFactory, C: Clock> {
    config: PoolConfig,
    factory: F,
    state: Mutex<PoolState<F::Session>>,
    clock: C,
    cancel: CancellationToken,
    next_resource_id: AtomicU64,
    acquired: AtomicU64,
    timeouts: AtomicU64,
}

impl<F: SessionFactory, C: Clock> PoolInner<F, C> {
    fn lock(&self) -> MutexGuard<'_, PoolState<F::Session>> {
        lock_recover(&self.state, "connection pool")
    }

    fn new_resource(&self, session: F::Session, now: Instant) -> Resource<F::Session> {
        Resource {
            id: self.next_resource_id.fetch_add(1, Ordering::Relaxed) + 1,
            session,
            state: ResourceState::Idle,
            created_at: now,
            last_used_at: now,
        }
    }

    fn pending(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Hand `resource` to the longest waiter still listening, or park it.
    fn place_locked(&self, state: &mut PoolState<F::Session>, mut resource: Resource<F::Session>) {
        while let Some(Waiter { id, sender }) = state.waiters.pop_front() {
            resource.state = ResourceState::Borrowed;
            match sender.send(resource) {
                Ok(()) => {
                    state.borrowed += 1;
                    debug!(waiter = id, "handed session to queued caller");
                    return;
                }
                Err(returned) => resource = returned,
            }
        }
        resource.state = ResourceState::Idle;
        state.idle.push_back(resource);
    }

    fn destroy(&self, mut resource: Resource<F::Session>) {
        resource.state = ResourceState::Destroyed;
        debug!(resource_id = resource.id, state = ?resource.state, "destroying pooled session");
        self.factory.destroy(resource.session);
    }

    /// Return a borrowed session without validating it.
    pub(crate) fn checkin(self: &Arc<Self>, mut resource: Resource<F::Session>) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.borrowed = state.borrowed.saturating_sub(1);
        if state.closed {
            state.destroyed += 1;
            drop(state);
            self.destroy(resource);
            return;
        }
        resource.last_used_at = now;
        self.place_locked(&mut state, resource);
    }

    /// Return a borrowed session, validating it first when configured to.
    pub(crate) async fn release(self: &Arc<Self>, mut resource: Resource<F::Session>) {
        if !self.config.validate_on_release {
            self.checkin(resource);
            return;
        }

        {
            let mut state = self.lock();
            state.borrowed = state.borrowed.saturating_sub(1);
            state.validating += 1;
        }
        resource.state = ResourceState::Validating;

        let slot = ValidatingSlot { pool: self, armed: true };
        let healthy = self.factory.validate(&resource.session).await;
        slot.disarm();

        let now = self.clock.now();
        let mut state = self.lock();
        state.validating -= 1;
        if state.closed {
            state.destroyed += 1;
            drop(state);
            self.destroy(resource);
            return;
        }
        if healthy {
            resource.last_used_at = now;
            self.place_locked(&mut state, resource);
            return;
        }

        state.destroyed += 1;
        self.spawn_replenish_locked(&mut state);
        drop(state);
        warn!(resource_id = resource.id, "session failed validation on release, destroying");
        self.destroy(resource);
    }

    /// Start a background creation when the pool is short and has room.
    fn spawn_replenish_locked(self: &Arc<Self>, state: &mut PoolState<F::Session>) {
        if state.closed {
            return;
        }
        let total = state.total();
        let wanted = !state.waiters.is_empty() || total < self.config.min_size;
        if !wanted || total >= self.config.max_size {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime available, skipping session replacement");
            return;
        };

        state.creating += 1;
        let pool = Arc::clone(self);
        handle.spawn(async move { pool.create_into_pool().await });
    }

    async fn create_into_pool(self: Arc<Self>) {
        let result = self.factory.create().await;
        let now = self.clock.now();

        let mut state = self.lock();
        state.creating = state.creating.saturating_sub(1);
        match result {
            Ok(session) => {
                state.created += 1;
                let resource = self.new_resource(session, now);
                if state.closed {
                    state.destroyed += 1;
                    drop(state);
                    self.destroy(resource);
                    return;
                }
                debug!(resource_id = resource.id, "replacement session created");
                self.place_locked(&mut state, resource);
            }
            Err(error) => {
                drop(state);
                warn!(error = %error, "replacement session creation failed");
            }
        }
    }

    /// Drop a waiter that gave up. Returns `false` when it had already been
    /// served, in which case the handed-over session goes back to the pool.
    fn abandon_waiter(
        self: &Arc<Self>,
        id: u64,
        receiver: &mut oneshot::Receiver<Resource<F::Session>>,
    ) -> bool {
        {
            let mut state = self.lock();
            if let Some(position) = state.waiters.iter().position(|waiter| waiter.id == id) {
                state.waiters.remove(position);
                return true;
            }
        }

        if let Ok(resource) = receiver.try_recv() {
            debug!(resource_id = resource.id, "session reached a departed waiter, recycling");
            self.checkin(resource);
        }
        false
    }

    fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let mut evicted = Vec::new();
        {
            let mut state = self.lock();
            if state.closed {
                return 0;
            }
            let mut index = 0;
            while index < state.idle.len() {
                if state.total() <= self.config.min_size {
                    break;
                }
                let stale = state
                    .idle
                    .get(index)
                    .is_some_and(|r| now.saturating_duration_since(r.last_used_at) >= self.config.idle_timeout);
                if stale {
                    if let Some(resource) = state.idle.remove(index) {
                        state.destroyed += 1;
                        evicted.push(resource);
                    }
                } else {
                    index += 1;
                }
            }
        }

        let count = evicted.len();
        for resource in evicted {
            self.destroy(resource);
        }
        if count > 0 {
            info!(evicted = count, "evicted idle sessions");
        }
        count
    }
}

impl<F: SessionFactory, C: Clock> Drop for PoolInner<F, C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ===== Drop guards =====

/// Creation slots reserved in `creating`; released on drop unless consumed.
struct CreateSlots<'a, F: SessionFactory, C: Clock> {
    pool: &'a Arc<PoolInner<F, C>>,
    remaining: usize,
}

impl<F: SessionFactory, C: Clock> CreateSlots<'_, F, C> {
    fn consume(&mut self, state: &mut PoolState<F::Session>) {
        if self.remaining > 0 {
            self.remaining -= 1;
            state.creating = state.creating.saturating_sub(1);
        }
    }
}

impl<F: SessionFactory, C: Clock> Drop for CreateSlots<'_, F, C> {
    fn drop(&mut self) {
        if self.remaining == 0 {
            return;
        }
        let mut state = self.pool.lock();
        state.creating = state.creating.saturating_sub(self.remaining);
        self.remaining = 0;
        self.pool.spawn_replenish_locked(&mut state);
    }
}

struct ValidatingSlot<'a, F: SessionFactory, C: Clock> {
    pool: &'a Arc<PoolInner<F, C>>,
    armed: bool,
}

impl<F: SessionFactory, C: Clock> ValidatingSlot<'_, F, C> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<F: SessionFactory, C: Clock> Drop for ValidatingSlot<'_, F, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Release was cancelled mid-validation; the session is gone with it.
        let mut state = self.pool.lock();
        state.validating = state.validating.saturating_sub(1);
        state.destroyed += 1;
        self.pool.spawn_replenish_locked(&mut state);
    }
}

/// A queued acquire; leaves the queue if the caller stops waiting.
struct PendingAcquire<'a, F: SessionFactory, C: Clock> {
    pool: &'a Arc<PoolInner<F, C>>,
    id: u64,
    receiver: oneshot::Receiver<Resource<F::Session>>,
    settled: bool,
}

impl<F: SessionFactory, C: Clock> Drop for PendingAcquire<'_, F, C> {
    fn drop(&mut self) {
        if !self.settled {
            self.pool.abandon_waiter(self.id, &mut self.receiver);
        }
    }
}

enum Step<S> {
    Ready(Resource<S>),
    Create,
    Wait { id: u64, receiver: oneshot::Receiver<Resource<S>> },
}

// ===== Public pool =====

/// Bounded FIFO pool of sessions produced by a [`SessionFactory`].
///
/// Cloning is cheap; clones share the same sessions.
pub struct ConnectionPool<F: SessionFactory, C: Clock = SystemClock> {
    inner: Arc<PoolInner<F, C>>,
}

impl<F: SessionFactory, C: Clock> Clone for ConnectionPool<F, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<F: SessionFactory, C: Clock> fmt::Debug for ConnectionPool<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool").field("metrics", &self.metrics()).finish()
    }
}

impl<F: SessionFactory> ConnectionPool<F, SystemClock> {
    /// Create a pool on the system clock.
    ///
    /// Sessions are created lazily; call [`warm_up`](Self::warm_up) to
    /// pre-create `min_size` of them. The idle evictor starts when a tokio
    /// runtime is available.
    pub fn new(factory: F, config: PoolConfig) -> ConfigResult<Self> {
        Self::with_clock(factory, config, SystemClock)
    }
}

impl<F: SessionFactory, C: Clock> ConnectionPool<F, C> {
    pub fn with_clock(factory: F, config: PoolConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        let inner = Arc::new(PoolInner {
            config,
            factory,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                borrowed: 0,
                validating: 0,
                creating: 0,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
                closed: false,
                created: 0,
                destroyed: 0,
            }),
            clock,
            cancel: CancellationToken::new(),
            next_resource_id: AtomicU64::new(0),
            acquired: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        });

        spawn_evictor(&inner);
        Ok(Self { inner })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Borrow a session, waiting up to `timeout`.
    ///
    /// Reuses an idle session when nobody is queued, otherwise creates one if
    /// the pool has room, otherwise joins the back of the queue. Creation
    /// errors are returned as-is without retry.
    pub async fn acquire(&self, timeout: Duration) -> Result<Lease<F, C>, PoolError<F::Error>> {
        let started = tokio::time::Instant::now();

        let step = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            if state.waiters.is_empty() && !state.idle.is_empty() {
                match state.idle.pop_back() {
                    Some(mut resource) => {
                        resource.state = ResourceState::Borrowed;
                        state.borrowed += 1;
                        Step::Ready(resource)
                    }
                    None => enqueue_locked(&mut state),
                }
            } else if state.waiters.is_empty() && state.total() < self.inner.config.max_size {
                state.creating += 1;
                Step::Create
            } else {
                let step = enqueue_locked(&mut state);
                // A failed replacement can leave room with callers queued.
                self.inner.spawn_replenish_locked(&mut state);
                step
            }
        };

        match step {
            Step::Ready(resource) => Ok(self.lease(resource)),
            Step::Create => self.create_for_caller(timeout).await,
            Step::Wait { id, receiver } => self.wait_for_handoff(id, receiver, timeout, started).await,
        }
    }

    /// [`acquire`](Self::acquire) with the configured `acquire_timeout`.
    pub async fn acquire_default(&self) -> Result<Lease<F, C>, PoolError<F::Error>> {
        self.acquire(self.inner.config.acquire_timeout).await
    }

    async fn create_for_caller(&self, timeout: Duration) -> Result<Lease<F, C>, PoolError<F::Error>> {
        let mut slots = CreateSlots { pool: &self.inner, remaining: 1 };

        let session = match tokio::time::timeout(timeout, self.inner.factory.create()).await {
            Ok(Ok(session)) => session,
            Ok(Err(source)) => {
                warn!(error = %source, "session creation failed");
                return Err(PoolError::Create { source });
            }
            Err(_) => {
                self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
                let pending = self.inner.pending();
                warn!(timeout_ms = timeout.as_millis() as u64, "session creation exceeded acquire timeout");
                return Err(PoolError::AcquireTimeout { waited: timeout, pending });
            }
        };

        let now = self.inner.clock.now();
        let mut resource = self.inner.new_resource(session, now);
        let mut state = self.inner.lock();
        slots.consume(&mut state);
        state.created += 1;
        if state.closed {
            state.destroyed += 1;
            drop(state);
            self.inner.destroy(resource);
            return Err(PoolError::Closed);
        }
        state.borrowed += 1;
        drop(state);

        resource.state = ResourceState::Borrowed;
        debug!(resource_id = resource.id, "created session for caller");
        Ok(self.lease(resource))
    }

    async fn wait_for_handoff(
        &self,
        id: u64,
        receiver: oneshot::Receiver<Resource<F::Session>>,
        timeout: Duration,
        started: tokio::time::Instant,
    ) -> Result<Lease<F, C>, PoolError<F::Error>> {
        let mut pending = PendingAcquire { pool: &self.inner, id, receiver, settled: false };

        match tokio::time::timeout(timeout, &mut pending.receiver).await {
            Ok(Ok(resource)) => {
                pending.settled = true;
                Ok(self.lease(resource))
            }
            Ok(Err(_)) => {
                pending.settled = true;
                Err(PoolError::Closed)
            }
            Err(_) => {
                pending.settled = true;
                self.inner.abandon_waiter(id, &mut pending.receiver);
                self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
                let waited = started.elapsed();
                let still_queued = self.inner.pending();
                warn!(
                    waited_ms = waited.as_millis() as u64,
                    pending = still_queued,
                    "timed out waiting for a pooled session"
                );
                Err(PoolError::AcquireTimeout { waited, pending: still_queued })
            }
        }
    }

    fn lease(&self, resource: Resource<F::Session>) -> Lease<F, C> {
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        Lease::new(Arc::clone(&self.inner), resource)
    }

    /// Create sessions until the pool holds `min_size`.
    ///
    /// Returns how many were created. Creations run concurrently; the first
    /// failure is reported after every attempt has settled.
    pub async fn warm_up(&self) -> Result<usize, PoolError<F::Error>> {
        let wanted = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            let missing = self.inner.config.min_size.saturating_sub(state.total());
            state.creating += missing;
            missing
        };
        if wanted == 0 {
            return Ok(0);
        }

        let mut slots = CreateSlots { pool: &self.inner, remaining: wanted };
        let results = join_all((0..wanted).map(|_| self.inner.factory.create())).await;
        let now = self.inner.clock.now();

        let mut created = 0;
        let mut first_error = None;
        let mut doomed = Vec::new();
        {
            let mut state = self.inner.lock();
            for result in results {
                slots.consume(&mut state);
                match result {
                    Ok(session) => {
                        state.created += 1;
                        let resource = self.inner.new_resource(session, now);
                        if state.closed {
                            state.destroyed += 1;
                            doomed.push(resource);
                        } else {
                            created += 1;
                            self.inner.place_locked(&mut state, resource);
                        }
                    }
                    Err(error) => {
                        first_error.get_or_insert(error);
                    }
                }
            }
        }
        for resource in doomed {
            self.inner.destroy(resource);
        }

        match first_error {
            Some(source) => {
                warn!(created, error = %source, "pool warm-up incomplete");
                Err(PoolError::Create { source })
            }
            None => {
                info!(created, "connection pool warmed up");
                Ok(created)
            }
        }
    }

    /// Destroy idle sessions past `idle_timeout`, keeping at least `min_size`.
    pub fn evict_idle(&self) -> usize {
        self.inner.evict_idle()
    }

    /// Close the pool. Idempotent.
    ///
    /// Queued callers fail with [`PoolError::Closed`], idle sessions are
    /// destroyed now and borrowed ones when their lease ends.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();

        let (idle, waiters) = {
            let mut state = self.inner.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.destroyed += state.idle.len() as u64;
            (std::mem::take(&mut state.idle), std::mem::take(&mut state.waiters))
        };

        let failed_waiters = waiters.len();
        drop(waiters);
        let destroyed = idle.len();
        for resource in idle {
            self.inner.destroy(resource);
        }
        info!(destroyed, failed_waiters, "connection pool shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.inner.lock();
        PoolMetrics {
            size: state.total(),
            available: state.idle.len(),
            borrowed: state.borrowed,
            validating: state.validating,
            creating: state.creating,
            pending: state.waiters.len(),
            min_size: self.inner.config.min_size,
            max_size: self.inner.config.max_size,
            created: state.created,
            destroyed: state.destroyed,
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            timeouts: self.inner.timeouts.load(Ordering::Relaxed),
            closed: state.closed,
        }
    }
}

fn enqueue_locked<S>(state: &mut PoolState<S>) -> Step<S> {
    let (sender, receiver) = oneshot::channel();
    state.next_waiter_id += 1;
    let id = state.next_waiter_id;
    state.waiters.push_back(Waiter { id, sender });
    Step::Wait { id, receiver }
}

fn spawn_evictor<F: SessionFactory, C: Clock>(inner: &Arc<PoolInner<F, C>>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        debug!("no tokio runtime available, idle eviction runs only on demand");
        return;
    };

    let weak: Weak<PoolInner<F, C>> = Arc::downgrade(inner);
    let cancel = inner.cancel.clone();
    let period = inner.config.eviction_interval;

    handle.spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(pool) = weak.upgrade() else { break };
                    pool.evict_idle();
                }
            }
        }
        debug!("idle evictor stopped");
    });
}

#[cfg(test)]
mod tests {
    //! Unit tests for pool::core.
    use std::sync::atomic::{AtomicBool, AtomicU32};

    use super::*;
    use crate::resilience::MockClock;

    #[derive(Debug, thiserror::Error)]
    #[error("backend refused session")]
    struct Refused;

    #[derive(Debug)]
    struct TestSession {
        serial: u32,
    }

    #[derive(Default)]
    struct TestFactory {
        created: AtomicU32,
        destroyed: AtomicU32,
        fail: AtomicBool,
        unhealthy: AtomicBool,
    }

    #[async_trait::async_trait]
    impl SessionFactory for Arc<TestFactory> {
        type Session = TestSession;
        type Error = Refused;

        async fn create(&self) -> Result<TestSession, Refused> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Refused);
            }
            let serial = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TestSession { serial })
        }

        async fn validate(&self, _session: &TestSession) -> bool {
            !self.unhealthy.load(Ordering::SeqCst)
        }

        fn destroy(&self, _session: TestSession) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(min: usize, max: usize) -> PoolConfig {
        PoolConfig::builder()
            .min_size(min)
            .max_size(max)
            .acquire_timeout(Duration::from_millis(500))
            .idle_timeout(Duration::from_secs(300))
            .eviction_interval(Duration::from_secs(3600))
            .build()
            .unwrap()
    }

    fn pool(min: usize, max: usize) -> (ConnectionPool<Arc<TestFactory>, MockClock>, Arc<TestFactory>, MockClock) {
        let factory = Arc::new(TestFactory::default());
        let clock = MockClock::new();
        let pool = ConnectionPool::with_clock(Arc::clone(&factory), config(min, max), clock.clone()).unwrap();
        (pool, factory, clock)
    }

    // ===== Acquire and release =====

    /// Validates lazy creation and reuse of a released session.
    ///
    /// Assertions:
    /// - first acquire creates a session
    /// - after release the same session is handed out again
    #[tokio::test]
    async fn test_acquire_creates_then_reuses() {
        let (pool, factory, _clock) = pool(0, 2);

        let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let first = lease.serial;
        lease.release().await;

        let again = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(again.serial, first);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        let metrics = pool.metrics();
        assert_eq!(metrics.borrowed, 1);
        assert_eq!(metrics.acquired, 2);
    }

    #[tokio::test]
    async fn test_dropped_lease_returns_to_pool() {
        let (pool, _factory, _clock) = pool(0, 1);

        {
            let _lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
            assert_eq!(pool.metrics().borrowed, 1);
        }

        let metrics = pool.metrics();
        assert_eq!((metrics.borrowed, metrics.available), (0, 1));
    }

    /// Validates that the pool never exceeds `max_size`.
    ///
    /// Assertions:
    /// - the (max + 1)th caller times out with `AcquireTimeout`
    /// - the timed-out caller no longer counts as pending
    #[tokio::test(start_paused = true)]
    async fn test_acquire_beyond_max_times_out() {
        let (pool, factory, _clock) = pool(0, 2);

        let _a = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let _b = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let err = pool.acquire(Duration::from_millis(100)).await.unwrap_err();
        match err {
            PoolError::AcquireTimeout { waited, pending } => {
                assert!(waited >= Duration::from_millis(100));
                assert_eq!(pending, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let metrics = pool.metrics();
        assert_eq!(metrics.size, 2);
        assert_eq!(metrics.pending, 0);
        assert_eq!(metrics.timeouts, 1);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    /// Validates strict arrival-order service of queued callers.
    ///
    /// Assertions:
    /// - three callers queued behind a single session are served 0, 1, 2
    /// - a released session goes straight to the head waiter
    #[tokio::test]
    async fn test_waiters_served_in_fifo_order() {
        let (pool, _factory, _clock) = pool(0, 1);
        let held = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();
        let mut handles = Vec::new();
        for caller in 0..3 {
            let task_pool = pool.clone();
            let order_tx = order_tx.clone();
            handles.push(tokio::spawn(async move {
                let lease = task_pool.acquire(Duration::from_secs(10)).await.unwrap();
                order_tx.send(caller).unwrap();
                lease.release().await;
            }));
            while pool.metrics().pending < caller + 1 {
                tokio::task::yield_now().await;
            }
        }

        held.release().await;
        for handle in handles {
            handle.await.unwrap();
        }

        let mut order = Vec::new();
        while let Ok(caller) = order_rx.try_recv() {
            order.push(caller);
        }
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(pool.metrics().available, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_waiter_leaves_only_itself() {
        let (pool, _factory, _clock) = pool(0, 1);
        let held = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let patient = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(30)).await.map(|l| l.serial) })
        };
        while pool.metrics().pending < 1 {
            tokio::task::yield_now().await;
        }

        let impatient = pool.acquire(Duration::from_millis(50)).await;
        assert!(matches!(impatient, Err(PoolError::AcquireTimeout { pending: 1, .. })));

        let serial = held.serial;
        drop(held);
        assert_eq!(patient.await.unwrap().unwrap(), serial);
    }

    #[tokio::test]
    async fn test_cancelled_acquire_leaves_queue() {
        let (pool, _factory, _clock) = pool(0, 1);
        let held = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let waiting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(60)).await.is_ok() })
        };
        while pool.metrics().pending < 1 {
            tokio::task::yield_now().await;
        }
        waiting.abort();
        let _ = waiting.await;

        assert_eq!(pool.metrics().pending, 0);
        drop(held);
        assert_eq!(pool.metrics().available, 1);
    }

    // ===== Creation failures =====

    /// Validates that creation errors surface unretried and free their slot.
    #[tokio::test]
    async fn test_create_error_propagates() {
        let (pool, factory, _clock) = pool(0, 1);
        factory.fail.store(true, Ordering::SeqCst);

        let err = pool.acquire(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, PoolError::Create { .. }));
        assert_eq!(pool.metrics().size, 0);

        factory.fail.store(false, Ordering::SeqCst);
        assert!(pool.acquire(Duration::from_secs(1)).await.is_ok());
    }

    /// Validates that queued callers are not stranded when a replacement
    /// session fails to be created.
    ///
    /// Assertions:
    /// - the pool is left with room and a queued caller
    /// - the next acquire starts a creation that serves the queued caller
    /// - the new caller is served once that session comes back
    #[tokio::test]
    async fn test_failed_replacement_does_not_strand_waiters() {
        let factory = Arc::new(TestFactory::default());
        let config = PoolConfig { validate_on_release: true, ..config(0, 2) };
        let pool = ConnectionPool::with_clock(Arc::clone(&factory), config, MockClock::new()).unwrap();

        let first = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let _second = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let queued = {
            let task_pool = pool.clone();
            tokio::spawn(async move { task_pool.acquire(Duration::from_secs(10)).await.map(|lease| lease.serial) })
        };
        while pool.metrics().pending < 1 {
            tokio::task::yield_now().await;
        }

        factory.unhealthy.store(true, Ordering::SeqCst);
        factory.fail.store(true, Ordering::SeqCst);
        first.release().await;
        while pool.metrics().creating > 0 {
            tokio::task::yield_now().await;
        }
        let metrics = pool.metrics();
        assert_eq!((metrics.size, metrics.pending), (1, 1));

        factory.unhealthy.store(false, Ordering::SeqCst);
        factory.fail.store(false, Ordering::SeqCst);
        let late = pool.acquire(Duration::from_secs(5)).await.unwrap();

        let served = queued.await.unwrap().unwrap();
        assert_eq!(served, 3);
        assert_eq!(late.serial, served);
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
        assert!(pool.metrics().size <= 2);
    }

    // ===== Validation =====

    #[tokio::test]
    async fn test_failed_validation_replaces_session() {
        let factory = Arc::new(TestFactory::default());
        let config = PoolConfig { validate_on_release: true, ..config(1, 2) };
        let pool = ConnectionPool::with_clock(Arc::clone(&factory), config, MockClock::new()).unwrap();

        let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let original = lease.serial;
        factory.unhealthy.store(true, Ordering::SeqCst);
        lease.release().await;

        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);
        factory.unhealthy.store(false, Ordering::SeqCst);

        let replacement = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_ne!(replacement.serial, original);
        assert_eq!(pool.metrics().destroyed, 1);
    }

    // ===== Eviction =====

    /// Validates idle eviction by age without going below `min_size`.
    ///
    /// Assertions:
    /// - nothing is evicted before `idle_timeout`
    /// - afterwards only the sessions above `min_size` are destroyed
    #[tokio::test]
    async fn test_evict_idle_respects_min_size() {
        let (pool, factory, clock) = pool(1, 3);

        let leases = vec![
            pool.acquire(Duration::from_secs(1)).await.unwrap(),
            pool.acquire(Duration::from_secs(1)).await.unwrap(),
            pool.acquire(Duration::from_secs(1)).await.unwrap(),
        ];
        for lease in leases {
            lease.release().await;
        }
        assert_eq!(pool.metrics().available, 3);

        clock.advance(Duration::from_secs(299));
        assert_eq!(pool.evict_idle(), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(pool.evict_idle(), 2);
        assert_eq!(pool.metrics().size, 1);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 2);
    }

    // ===== Warm-up and shutdown =====

    #[tokio::test]
    async fn test_warm_up_fills_to_min() {
        let (pool, factory, _clock) = pool(2, 5);

        assert_eq!(pool.warm_up().await.unwrap(), 2);
        assert_eq!(pool.warm_up().await.unwrap(), 0);
        assert_eq!(pool.metrics().available, 2);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    /// Validates shutdown semantics.
    ///
    /// Assertions:
    /// - idle sessions are destroyed at once, borrowed ones on return
    /// - later acquires fail with `Closed`
    #[tokio::test]
    async fn test_shutdown_fails_waiters_and_destroys_sessions() {
        let (pool, factory, _clock) = pool(2, 2);
        pool.warm_up().await.unwrap();
        let first = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let second = pool.acquire(Duration::from_secs(1)).await.unwrap();
        first.release().await;

        pool.shutdown();
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 1);

        drop(second);
        assert_eq!(factory.destroyed.load(Ordering::SeqCst), 2);
        assert!(matches!(pool.acquire(Duration::from_secs(1)).await, Err(PoolError::Closed)));
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_callers() {
        let (pool, _factory, _clock) = pool(0, 1);
        let _held = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(60)).await.map(|_| ()) })
        };
        while pool.metrics().pending < 1 {
            tokio::task::yield_now().await;
        }

        pool.shutdown();
        pool.shutdown();

        assert!(matches!(waiter.await.unwrap(), Err(PoolError::Closed)));
        assert_eq!(pool.metrics().pending, 0);
    }
}
