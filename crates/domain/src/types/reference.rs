//! Reference records served from the cache.
//!
//! Each record keeps the fields analytics code relies on and collects
//! anything else the backend returns in `extra`, so new server-side fields
//! never break decoding.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::relation::{falsy, many2one, Many2One};

/// A record type that can be listed with `search_read`.
pub trait RemoteRecord: DeserializeOwned + Serialize + Send + Sync + 'static {
    /// Backend model name, e.g. `crm.stage`
    const MODEL: &'static str;
    /// Fields requested from the backend
    const FIELDS: &'static [&'static str];

    /// Search domain applied when listing every record.
    fn default_domain() -> Value {
        json!([])
    }

    /// Sort order applied when listing every record.
    fn default_order() -> Option<&'static str> {
        None
    }
}

fn default_true() -> bool {
    true
}

// ===== Records =====

/// Stage of the sales pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sequence: i64,
    #[serde(default)]
    pub is_won: bool,
    /// Folded stages are hidden in kanban views
    #[serde(default)]
    pub fold: bool,
    #[serde(default, with = "many2one")]
    pub team_id: Option<Many2One>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RemoteRecord for PipelineStage {
    const MODEL: &'static str = "crm.stage";
    const FIELDS: &'static [&'static str] = &["id", "name", "sequence", "is_won", "fold", "team_id"];

    fn default_order() -> Option<&'static str> {
        Some("sequence asc")
    }
}

/// Reason recorded when an opportunity is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LostReason {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RemoteRecord for LostReason {
    const MODEL: &'static str = "crm.lost.reason";
    const FIELDS: &'static [&'static str] = &["id", "name", "active"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesTeam {
    pub id: i64,
    pub name: String,
    /// Team leader
    #[serde(default, with = "many2one")]
    pub user_id: Option<Many2One>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RemoteRecord for SalesTeam {
    const MODEL: &'static str = "crm.team";
    const FIELDS: &'static [&'static str] = &["id", "name", "user_id", "active"];
}

/// Internal user who owns opportunities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Salesperson {
    pub id: i64,
    pub name: String,
    #[serde(default, with = "falsy")]
    pub login: Option<String>,
    #[serde(default, with = "falsy")]
    pub email: Option<String>,
    #[serde(default, with = "many2one")]
    pub sale_team_id: Option<Many2One>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RemoteRecord for Salesperson {
    const MODEL: &'static str = "res.users";
    const FIELDS: &'static [&'static str] = &["id", "name", "login", "email", "sale_team_id"];

    fn default_domain() -> Value {
        json!([["share", "=", false]])
    }

    fn default_order() -> Option<&'static str> {
        Some("name asc")
    }
}

/// Country subdivision used for geographic breakdowns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryState {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, with = "many2one")]
    pub country_id: Option<Many2One>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RemoteRecord for CountryState {
    const MODEL: &'static str = "res.country.state";
    const FIELDS: &'static [&'static str] = &["id", "name", "code", "country_id"];
}
