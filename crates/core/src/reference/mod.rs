//! Reference data accessors and warm-up
//!
//! Reference listings change rarely and are read on almost every analytics
//! request. They are cached as raw JSON by the gateway and decoded into typed
//! records on every read, so one cache serves every record type.

pub mod catalogue;

use async_trait::async_trait;
use erpshield_domain::{
    CountryState, LostReason, PipelineStage, RemoteRecord, Result, SalesTeam, Salesperson, ShieldError,
};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

pub use catalogue::ReferenceKey;

use crate::rpc::ports::ErpGateway;

/// Typed reference listings served through the gateway cache.
#[async_trait]
pub trait ReferenceData {
    async fn pipeline_stages(&self) -> Result<Vec<PipelineStage>>;
    async fn lost_reasons(&self) -> Result<Vec<LostReason>>;
    async fn sales_teams(&self) -> Result<Vec<SalesTeam>>;
    async fn salespeople(&self) -> Result<Vec<Salesperson>>;
    async fn country_states(&self) -> Result<Vec<CountryState>>;
}

async fn cached_listing<G, T>(gateway: &G, key: ReferenceKey) -> Result<Vec<T>>
where
    G: ErpGateway + ?Sized,
    T: RemoteRecord,
{
    let value = gateway.cached_call(key.cache_key(), key.search_read_call(), None).await?;
    decode_records(value)
}

/// Decode a `search_read` result into records.
pub fn decode_records<T: RemoteRecord>(value: Value) -> Result<Vec<T>> {
    serde_json::from_value(value).map_err(|err| ShieldError::serialization(format!("{}: {err}", T::MODEL)))
}

#[async_trait]
impl<G> ReferenceData for G
where
    G: ErpGateway + ?Sized,
{
    async fn pipeline_stages(&self) -> Result<Vec<PipelineStage>> {
        cached_listing(self, ReferenceKey::PipelineStages).await
    }

    async fn lost_reasons(&self) -> Result<Vec<LostReason>> {
        cached_listing(self, ReferenceKey::LostReasons).await
    }

    async fn sales_teams(&self) -> Result<Vec<SalesTeam>> {
        cached_listing(self, ReferenceKey::SalesTeams).await
    }

    async fn salespeople(&self) -> Result<Vec<Salesperson>> {
        cached_listing(self, ReferenceKey::Salespeople).await
    }

    async fn country_states(&self) -> Result<Vec<CountryState>> {
        cached_listing(self, ReferenceKey::CountryStates).await
    }
}

// ===== Warm-up =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarmUpFailure {
    pub key: String,
    pub error: ShieldError,
}

/// Outcome of pre-populating the reference cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmUpReport {
    /// Keys now cached
    pub loaded: Vec<String>,
    pub failed: Vec<WarmUpFailure>,
    /// Sessions opened while warming the pool
    pub sessions_opened: usize,
}

impl WarmUpReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Load every reference listing concurrently.
///
/// A failing key is reported and does not stop the others.
pub async fn warm_up_reference<G>(gateway: &G) -> WarmUpReport
where
    G: ErpGateway + ?Sized,
{
    let loads = ReferenceKey::ALL.iter().map(|&key| async move {
        let outcome = gateway.cached_call(key.cache_key(), key.search_read_call(), None).await;
        (key, outcome)
    });

    let mut report = WarmUpReport::default();
    for (key, outcome) in join_all(loads).await {
        match outcome {
            Ok(_) => report.loaded.push(key.cache_key().to_string()),
            Err(error) => {
                warn!(key = %key, error = %error, "reference warm-up failed");
                report.failed.push(WarmUpFailure { key: key.cache_key().to_string(), error });
            }
        }
    }

    info!(loaded = report.loaded.len(), failed = report.failed.len(), "reference warm-up finished");
    report
}
