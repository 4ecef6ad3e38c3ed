//! Test helpers for code built on the resilience, cache and pool modules.
//!
//! - [`ScriptedOutcomes`]: replays a fixed sequence of results and counts calls
//! - [`poll_until`]: waits for an asynchronous condition on the tokio clock
//!
//! ```rust
//! use erpshield_common::testing::ScriptedOutcomes;
//!
//! let script: ScriptedOutcomes<u32, String> =
//!     ScriptedOutcomes::new([Err("reset".to_string()), Ok(7)]);
//! assert!(script.next().is_err());
//! assert_eq!(script.next(), Ok(7));
//! assert_eq!(script.calls(), 2);
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use crate::resilience::{Clock, MockClock, SystemClock};

/// Replays scripted results in order; the last one repeats once the script
/// runs out. Clones share the script and the call counter.
#[derive(Debug, Clone)]
pub struct ScriptedOutcomes<T, E> {
    script: Arc<Mutex<VecDeque<Result<T, E>>>>,
    last: Arc<Mutex<Option<Result<T, E>>>>,
    calls: Arc<AtomicUsize>,
}

impl<T: Clone, E: Clone> ScriptedOutcomes<T, E> {
    pub fn new(outcomes: impl IntoIterator<Item = Result<T, E>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            last: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `count` failures followed by `value` forever.
    pub fn failing_then(count: usize, error: E, value: T) -> Self {
        let mut outcomes: Vec<Result<T, E>> = (0..count).map(|_| Err(error.clone())).collect();
        outcomes.push(Ok(value));
        Self::new(outcomes)
    }

    /// Append further outcomes to the script.
    pub fn push(&self, outcome: Result<T, E>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Produce the next outcome.
    ///
    /// # Panics
    ///
    /// Panics if the script was empty from the start.
    pub fn next(&self) -> Result<T, E> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            *last = Some(outcome.clone());
            return outcome;
        }
        last.clone().expect("scripted outcomes exhausted before the first call")
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Poll `condition` every `interval` until it holds or `timeout` elapses.
///
/// Uses the tokio clock, so it also works under `start_paused`.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    condition().await
}
