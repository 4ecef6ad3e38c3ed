//! Background health monitoring with explicit lifecycle
//!
//! [`HealthMonitor`] probes the backend every interval and publishes status
//! changes as [`HealthTransition`]s on a `tokio::sync::watch` channel.
//! Subscribers only ever see the latest transition.
//!
//! - Explicit `start`/`stop` with a join handle
//! - Cancellation through a [`CancellationToken`]
//! - A deadline on every probe

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use erpshield_common::Clock;
use erpshield_core::RpcTransport;
use erpshield_domain::{HealthStatus, HealthTransition, Result, ShieldError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::rpc::client::ResilientRpcClient;

const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Something whose health can be checked periodically.
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    /// Current status, plus the failure text when the check failed.
    async fn probe(&self) -> (HealthStatus, Option<String>);
}

#[async_trait]
impl<T: RpcTransport, C: Clock> HealthProbe for ResilientRpcClient<T, C> {
    async fn probe(&self) -> (HealthStatus, Option<String>) {
        match self.health_check().await {
            Ok(()) => (self.health().status(), None),
            Err(err) => (HealthStatus::Unhealthy, Some(err.to_string())),
        }
    }
}

/// Periodic health checker publishing status transitions.
pub struct HealthMonitor<P: HealthProbe> {
    probe: Arc<P>,
    interval: Duration,
    check_timeout: Duration,
    sender: Arc<watch::Sender<HealthTransition>>,
    task_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl<P: HealthProbe> HealthMonitor<P> {
    pub fn new(probe: Arc<P>, interval: Duration) -> Self {
        let (sender, _) = watch::channel(HealthTransition::initial());
        Self {
            probe,
            interval,
            check_timeout: DEFAULT_CHECK_TIMEOUT.min(interval),
            sender: Arc::new(sender),
            task_handle: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Deadline on a single probe.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Receive every status change from now on.
    pub fn subscribe(&self) -> watch::Receiver<HealthTransition> {
        self.sender.subscribe()
    }

    /// Latest published status.
    pub fn status(&self) -> HealthStatus {
        self.sender.borrow().to
    }

    /// Spawn the worker. Fails if it is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.task_handle.is_some() {
            return Err(ShieldError::internal("Health monitor already running"));
        }
        if self.cancellation.is_cancelled() {
            self.cancellation = CancellationToken::new();
        }

        let worker = HealthWorker {
            probe: Arc::clone(&self.probe),
            sender: Arc::clone(&self.sender),
            interval: self.interval,
            check_timeout: self.check_timeout,
            cancel: self.cancellation.clone(),
        };

        info!(interval_secs = self.interval.as_secs(), "Starting health monitor");
        self.task_handle = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Signal the worker and wait for it to finish.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            tokio::time::timeout(STOP_TIMEOUT, handle)
                .await
                .map_err(|_| ShieldError::internal("Health monitor shutdown timeout"))?
                .map_err(|e| ShieldError::internal(format!("Task join failed: {e}")))?;
        }

        info!("Health monitor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some() && !self.cancellation.is_cancelled()
    }
}

impl<P: HealthProbe> Drop for HealthMonitor<P> {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

struct HealthWorker<P: HealthProbe> {
    probe: Arc<P>,
    sender: Arc<watch::Sender<HealthTransition>>,
    interval: Duration,
    check_timeout: Duration,
    cancel: CancellationToken,
}

impl<P: HealthProbe> HealthWorker<P> {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("Health monitor worker shutting down");
                    break;
                }
                _ = ticker.tick() => self.check_once().await,
            }
        }
    }

    async fn check_once(&self) {
        let (status, reason) = match tokio::time::timeout(self.check_timeout, self.probe.probe()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(timeout_ms = self.check_timeout.as_millis() as u64, "Health check timeout");
                (HealthStatus::Unknown, Some("health check timed out".to_string()))
            }
        };

        let previous = self.sender.borrow().to;
        if status == previous {
            return;
        }

        info!(previous_status = %previous, new_status = %status, reason = ?reason, "Backend health status changed");
        self.sender.send_replace(HealthTransition { from: previous, to: status, at: Utc::now(), reason });
    }
}
