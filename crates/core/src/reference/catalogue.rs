//! Catalogue of reference data kept warm in the cache.

use std::fmt;

use erpshield_domain::constants::{
    KEY_COUNTRY_STATES, KEY_LOST_REASONS, KEY_PIPELINE_STAGES, KEY_SALESPEOPLE, KEY_SALES_TEAMS,
};
use erpshield_domain::{CountryState, LostReason, PipelineStage, RemoteRecord, SalesTeam, Salesperson};

use crate::rpc::call::{RpcCall, SearchOptions};

/// One cached reference listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKey {
    PipelineStages,
    LostReasons,
    SalesTeams,
    Salespeople,
    CountryStates,
}

impl ReferenceKey {
    pub const ALL: [Self; 5] =
        [Self::PipelineStages, Self::LostReasons, Self::SalesTeams, Self::Salespeople, Self::CountryStates];

    /// Cache key, also used to look up the configured TTL.
    pub const fn cache_key(self) -> &'static str {
        match self {
            Self::PipelineStages => KEY_PIPELINE_STAGES,
            Self::LostReasons => KEY_LOST_REASONS,
            Self::SalesTeams => KEY_SALES_TEAMS,
            Self::Salespeople => KEY_SALESPEOPLE,
            Self::CountryStates => KEY_COUNTRY_STATES,
        }
    }

    pub const fn model(self) -> &'static str {
        match self {
            Self::PipelineStages => PipelineStage::MODEL,
            Self::LostReasons => LostReason::MODEL,
            Self::SalesTeams => SalesTeam::MODEL,
            Self::Salespeople => Salesperson::MODEL,
            Self::CountryStates => CountryState::MODEL,
        }
    }

    /// The `search_read` call listing every record of this kind.
    pub fn search_read_call(self) -> RpcCall {
        match self {
            Self::PipelineStages => listing::<PipelineStage>(),
            Self::LostReasons => listing::<LostReason>(),
            Self::SalesTeams => listing::<SalesTeam>(),
            Self::Salespeople => listing::<Salesperson>(),
            Self::CountryStates => listing::<CountryState>(),
        }
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_key())
    }
}

/// Full listing of `T` using its default domain and order.
pub fn listing<T: RemoteRecord>() -> RpcCall {
    let mut options = SearchOptions::default();
    if let Some(order) = T::default_order() {
        options = options.ordered(order);
    }
    RpcCall::search_read(T::MODEL, T::default_domain(), T::FIELDS, &options)
}
