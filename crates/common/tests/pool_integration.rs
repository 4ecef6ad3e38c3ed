//! Integration tests for the connection pool
//!
//! Covers bounded concurrency under a multi-threaded runtime and the
//! background idle evictor.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use erpshield_common::pool::{ConnectionPool, PoolConfig, PoolError, SessionFactory};
use erpshield_common::resilience::MockClock;
use erpshield_common::testing::poll_until;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("login rejected")]
struct LoginRejected;

#[derive(Debug)]
struct Session {
    uid: usize,
}

#[derive(Default)]
struct Counters {
    live: AtomicUsize,
    created: AtomicUsize,
}

/// Clones share counters, so a test keeps one and hands the other to the pool.
#[derive(Clone, Default)]
struct CountingFactory {
    counters: Arc<Counters>,
}

#[async_trait]
impl SessionFactory for CountingFactory {
    type Session = Session;
    type Error = LoginRejected;

    async fn create(&self) -> Result<Session, LoginRejected> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        Ok(Session { uid: self.counters.created.fetch_add(1, Ordering::SeqCst) + 1 })
    }

    fn destroy(&self, _session: Session) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Validates that concurrent callers never hold more than `max_size`
/// sessions at once.
///
/// # Test Steps
/// 1. Build a pool with max_size 3
/// 2. Spawn 24 workers that each borrow a session for 10 ms
/// 3. Track the peak number of simultaneously borrowed sessions
/// 4. Verify every worker succeeded, the peak is 3 and at most 3 sessions
///    were ever created
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrowers_stay_within_max() {
    let factory = CountingFactory::default();
    let config = PoolConfig::builder()
        .min_size(0)
        .max_size(3)
        .eviction_interval(Duration::from_secs(3600))
        .build()
        .expect("valid pool config");
    let pool = ConnectionPool::new(factory.clone(), config).expect("pool builds");

    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for _ in 0..24 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        let peak = Arc::clone(&peak);
        workers.push(tokio::spawn(async move {
            let lease = pool.acquire(Duration::from_secs(5)).await?;
            let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            in_use.fetch_sub(1, Ordering::SeqCst);
            assert!(lease.uid >= 1);
            lease.release().await;
            Ok::<_, PoolError<LoginRejected>>(())
        }));
    }

    for worker in workers {
        worker.await.expect("worker task").expect("acquire succeeds");
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(factory.counters.created.load(Ordering::SeqCst) <= 3);
    let metrics = pool.metrics();
    assert_eq!(metrics.acquired, 24);
    assert_eq!(metrics.borrowed, 0);
    assert_eq!(metrics.timeouts, 0);

    pool.shutdown();
    assert_eq!(factory.counters.live.load(Ordering::SeqCst), 0);
}

/// Validates the background evictor.
///
/// # Test Steps
/// 1. Build a pool with min 1, max 4, 2 s idle timeout, 1 s sweep interval
/// 2. Borrow and return four sessions
/// 3. Age them past the idle timeout on the mock clock
/// 4. Let the evictor tick and verify the pool shrinks back to min_size
#[tokio::test(start_paused = true)]
async fn test_background_evictor_trims_to_min() {
    let factory = CountingFactory::default();
    let clock = MockClock::new();
    let config = PoolConfig::builder()
        .min_size(1)
        .max_size(4)
        .idle_timeout(Duration::from_secs(2))
        .eviction_interval(Duration::from_secs(1))
        .build()
        .expect("valid pool config");
    let pool = ConnectionPool::with_clock(factory.clone(), config, clock.clone())
        .expect("pool builds");

    let mut leases = Vec::new();
    for _ in 0..4 {
        leases.push(pool.acquire(Duration::from_secs(1)).await.expect("acquire"));
    }
    for lease in leases {
        lease.release().await;
    }
    assert_eq!(pool.metrics().available, 4);

    clock.advance(Duration::from_secs(3));
    let trimmed = poll_until(Duration::from_secs(5), Duration::from_millis(500), || {
        let pool = pool.clone();
        async move { pool.metrics().size == 1 }
    })
    .await;

    assert!(trimmed, "evictor should shrink the pool to min_size");
    assert_eq!(factory.counters.live.load(Ordering::SeqCst), 1);
    assert_eq!(pool.metrics().destroyed, 3);
}
