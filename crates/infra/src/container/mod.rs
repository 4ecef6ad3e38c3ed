//! Composition root
//!
//! [`ShieldContainer`] wires the transport, session pool, cache, breakers,
//! client facade and health monitor from one [`Config`]. Nothing here is
//! global: every container owns its own components, so several can coexist
//! in one process.

use std::future::Future;
use std::sync::Arc;

use erpshield_common::{CircuitBreaker, Clock, SystemClock};
use erpshield_core::{CircuitHealth, RpcTransport, ShieldHealth, WarmUpReport};
use erpshield_domain::constants::VECTOR_BREAKER_NAME;
use erpshield_domain::{Config, HealthStatus, HealthTransition, Result};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::runtime::breaker_config;
use crate::errors::IntoShieldError;
use crate::health::{circuit_health, HealthMonitor};
use crate::rpc::{JsonRpcTransport, ResilientRpcClient};

/// What [`ShieldContainer::init`] does beyond construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Open `min_size` sessions and load every reference listing
    pub warm_up: bool,
    /// Start the background health monitor
    pub monitor: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self { warm_up: false, monitor: true }
    }
}

/// Health of everything the container owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerHealth {
    pub status: HealthStatus,
    pub erp: ShieldHealth,
    pub vector_search: CircuitHealth,
    /// Last status published by the monitor
    pub monitor: HealthStatus,
}

/// Owns every component of one resilience layer instance.
pub struct ShieldContainer<T: RpcTransport = JsonRpcTransport, C: Clock = SystemClock> {
    config: Config,
    client: ResilientRpcClient<T, C>,
    vector_breaker: CircuitBreaker<C>,
    monitor: HealthMonitor<ResilientRpcClient<T, C>>,
    warm_up_report: Option<WarmUpReport>,
}

impl ShieldContainer {
    /// Build against the JSON-RPC backend named in `config`.
    ///
    /// # Errors
    /// Returns `ShieldError::Config` when `config` does not validate.
    pub async fn init(config: Config, options: ContainerOptions) -> Result<Self> {
        config.validate()?;
        let transport = JsonRpcTransport::new(&config.backend.url).with_request_timeout(config.backend.batch_timeout);
        Self::with_transport(transport, config, options, SystemClock).await
    }
}

impl<T: RpcTransport, C: Clock + Clone> ShieldContainer<T, C> {
    /// Build around any transport and clock.
    pub async fn with_transport(transport: T, config: Config, options: ContainerOptions, clock: C) -> Result<Self> {
        let client = ResilientRpcClient::with_clock(transport, &config, clock.clone())?;
        let vector_breaker =
            CircuitBreaker::with_clock(breaker_config(VECTOR_BREAKER_NAME, &config.vector_breaker)?, clock)
                .map_err(IntoShieldError::into_shield)?;
        let monitor = HealthMonitor::new(Arc::new(client.clone()), config.health.interval());

        let mut container = Self { config, client, vector_breaker, monitor, warm_up_report: None };

        if options.warm_up {
            let report = container.client.warm_up().await;
            if report.is_complete() {
                info!(loaded = report.loaded.len(), sessions = report.sessions_opened, "warm-up complete");
            } else {
                warn!(loaded = report.loaded.len(), failed = report.failed.len(), "warm-up incomplete");
            }
            container.warm_up_report = Some(report);
        }

        if options.monitor {
            container.monitor.start()?;
        }

        info!(
            backend = %container.config.backend.url,
            database = %container.config.backend.database,
            monitor = options.monitor,
            "shield container initialised"
        );
        Ok(container)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The resilient facade analytics code calls.
    pub fn client(&self) -> &ResilientRpcClient<T, C> {
        &self.client
    }

    pub fn vector_breaker(&self) -> &CircuitBreaker<C> {
        &self.vector_breaker
    }

    pub fn warm_up_report(&self) -> Option<&WarmUpReport> {
        self.warm_up_report.as_ref()
    }

    /// Run a vector search call behind its own breaker.
    pub async fn call_vector<F, Fut, R>(&self, operation: F) -> Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.vector_breaker.execute(operation).await.map_err(IntoShieldError::into_shield)
    }

    pub fn subscribe_health(&self) -> watch::Receiver<HealthTransition> {
        self.monitor.subscribe()
    }

    pub fn health(&self) -> ContainerHealth {
        let erp = self.client.health();
        let vector_search = circuit_health(&self.vector_breaker.metrics());
        // Vector search is optional: its breaker can only degrade the total.
        let status = match (erp.status(), vector_search.status()) {
            (HealthStatus::Healthy, HealthStatus::Degraded | HealthStatus::Unhealthy) => HealthStatus::Degraded,
            (status, _) => status,
        };

        ContainerHealth { status, erp, vector_search, monitor: self.monitor.status() }
    }

    /// Stop the monitor and close the pool.
    ///
    /// # Errors
    /// Returns `ShieldError::Internal` when the monitor does not stop in
    /// time; the pool is closed regardless.
    pub async fn shutdown(&mut self) -> Result<()> {
        let stopped = self.monitor.stop().await;
        self.client.shutdown();
        info!("shield container shut down");
        if let Err(err) = &stopped {
            warn!(error = %err, "health monitor did not stop cleanly");
        }
        stopped
    }
}
