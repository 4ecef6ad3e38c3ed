//! Port interfaces for reaching the ERP backend

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use erpshield_domain::{BackendConfig, Result};
use serde_json::Value;

use super::call::RpcCall;
use crate::health::ShieldHealth;

/// Login credentials for the backend database.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(database: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { database: database.into(), username: username.into(), password: password.into() }
    }
}

impl From<&BackendConfig> for Credentials {
    fn from(config: &BackendConfig) -> Self {
        Self::new(&config.database, &config.username, &config.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Wire protocol to the backend.
///
/// Sessions are expensive to open and are pooled by the caller. Errors are
/// already classified: connection problems come back as
/// `ShieldError::Transient`, refusals as `Permanent` or `Authentication`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// An open connection to the backend
    type Session: Send + Sync + 'static;

    /// Open a session and check the backend answers.
    async fn open_session(&self) -> Result<Self::Session>;

    /// Whether `session` is still usable.
    async fn ping(&self, session: &Self::Session) -> bool;

    /// Authenticate and return the backend user id.
    async fn login(&self, session: &Self::Session, credentials: &Credentials) -> Result<i64>;

    /// Run one object call as user `uid`.
    async fn execute_kw(
        &self,
        session: &Self::Session,
        credentials: &Credentials,
        uid: i64,
        call: &RpcCall,
    ) -> Result<Value>;

    /// Release whatever the session holds.
    fn close_session(&self, session: Self::Session) {
        drop(session);
    }
}

/// Resilient execution surface offered to analytics collaborators.
///
/// Implementations put every call behind the circuit breaker, a deadline and
/// retries, and serve cached calls with stale-while-revalidate semantics.
#[async_trait]
pub trait ErpGateway: Send + Sync {
    /// Run an ordinary call under the API deadline.
    async fn execute(&self, call: RpcCall) -> Result<Value>;

    /// Run a long batch/export call under the batch deadline.
    async fn execute_batch(&self, call: RpcCall) -> Result<Value>;

    /// Serve `key` from the cache, running `call` to fill or refresh it.
    ///
    /// `ttl` falls back to the configured per-key TTL.
    async fn cached_call(&self, key: &str, call: RpcCall, ttl: Option<Duration>) -> Result<Value>;

    /// Point-in-time health of breaker, pool and cache.
    fn health(&self) -> ShieldHealth;
}
