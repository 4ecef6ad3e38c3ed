//! Resilience benchmarks
//!
//! Measures the per-call overhead of the breaker admission path, backoff
//! calculation and a retry executor that succeeds on the first attempt.
//!
//! Run with: `cargo bench --bench resilience_bench -p erpshield-common
//! --features runtime`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use erpshield_common::resilience::{
    policies, BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, Jitter, MockClock,
    RetryConfig, RetryExecutor,
};
use tokio::runtime::Builder as RuntimeBuilder;

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_circuit_breaker(c: &mut Criterion) {
    let runtime = RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime for benchmarks");
    let mut group = c.benchmark_group("circuit_breaker");

    group.bench_function("closed_success", |b| {
        let breaker = CircuitBreaker::with_clock(CircuitBreakerConfig::default(), MockClock::new())
            .expect("default breaker config");
        b.iter(|| {
            runtime.block_on(async {
                let result = breaker.execute(|| async { Ok::<_, std::io::Error>(1_u32) }).await;
                black_box(result.is_ok())
            })
        });
    });

    group.bench_function("open_rejection", |b| {
        let breaker = CircuitBreaker::with_clock(
            CircuitBreakerConfig { failure_threshold: 1, ..CircuitBreakerConfig::default() },
            MockClock::new(),
        )
        .expect("breaker config");
        runtime.block_on(async {
            let _ = breaker
                .execute(|| async { Err::<(), _>(std::io::Error::other("trip")) })
                .await;
        });

        b.iter(|| {
            runtime.block_on(async {
                let result = breaker.execute(|| async { Ok::<_, std::io::Error>(()) }).await;
                black_box(result.is_err())
            })
        });
    });

    group.bench_function("metrics_snapshot", |b| {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default()).expect("breaker");
        b.iter(|| black_box(breaker.metrics()));
    });

    group.finish();
}

// ============================================================================
// Retry Benchmarks
// ============================================================================

fn bench_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff");
    let exponential = BackoffStrategy::Exponential {
        initial_delay: Duration::from_millis(200),
        base: 2.0,
        max_delay: Duration::from_secs(5),
    };

    for attempt in [0_u32, 3, 10] {
        group.bench_with_input(BenchmarkId::new("exponential", attempt), &attempt, |b, &attempt| {
            b.iter(|| black_box(exponential.calculate_delay(black_box(attempt))));
        });
        group.bench_with_input(BenchmarkId::new("equal_jitter", attempt), &attempt, |b, &attempt| {
            b.iter(|| Jitter::Equal.apply(exponential.calculate_delay(black_box(attempt))));
        });
    }

    group.finish();
}

fn bench_retry_first_attempt(c: &mut Criterion) {
    let runtime = RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime for benchmarks");
    let executor = RetryExecutor::new(RetryConfig::default(), policies::AlwaysRetry);

    c.bench_function("retry_first_attempt_success", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let result = executor
                    .execute(|| async { Ok::<_, std::io::Error>(black_box(7_u32)) })
                    .await;
                black_box(result.is_ok())
            })
        });
    });
}

criterion_group!(benches, bench_circuit_breaker, bench_backoff, bench_retry_first_attempt);
criterion_main!(benches);
