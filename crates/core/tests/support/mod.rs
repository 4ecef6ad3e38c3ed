//! Shared fixtures for core integration tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use erpshield_core::{CacheHealth, CircuitHealth, ErpGateway, PoolHealth, RpcCall, ShieldHealth};
use erpshield_domain::{Result, ShieldError};
use serde_json::Value;

/// In-memory gateway answering calls by model name.
///
/// `cached_call` keeps the first successful value per key, which is enough to
/// observe how often the backend would be reached.
#[derive(Default)]
pub struct FakeGateway {
    responses: Mutex<HashMap<String, Result<Value>>>,
    cache: Mutex<BTreeMap<String, Value>>,
    calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, model: &str, value: Value) -> Self {
        self.responses.lock().unwrap().insert(model.to_string(), Ok(value));
        self
    }

    pub fn fail(self, model: &str, error: ShieldError) -> Self {
        self.responses.lock().unwrap().insert(model.to_string(), Err(error));
        self
    }

    /// Labels of calls that reached the "backend", in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cached_keys(&self) -> Vec<String> {
        self.cache.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ErpGateway for FakeGateway {
    async fn execute(&self, call: RpcCall) -> Result<Value> {
        self.calls.lock().unwrap().push(call.label());
        self.responses
            .lock()
            .unwrap()
            .get(&call.model)
            .cloned()
            .unwrap_or_else(|| Err(ShieldError::permanent(format!("unknown model {}", call.model))))
    }

    async fn execute_batch(&self, call: RpcCall) -> Result<Value> {
        self.execute(call).await
    }

    async fn cached_call(&self, key: &str, call: RpcCall, _ttl: Option<Duration>) -> Result<Value> {
        if let Some(value) = self.cache.lock().unwrap().get(key) {
            return Ok(value.clone());
        }
        let value = self.execute(call).await?;
        self.cache.lock().unwrap().insert(key.to_string(), value.clone());
        Ok(value)
    }

    fn health(&self) -> ShieldHealth {
        ShieldHealth {
            circuit: CircuitHealth {
                name: "erp".into(),
                state: "CLOSED".into(),
                consecutive_failures: 0,
                seconds_until_retry: None,
            },
            pool: PoolHealth { size: 0, available: 0, borrowed: 0, pending: 0, max_size: 5 },
            cache: CacheHealth { size: self.cache.lock().unwrap().len(), hits: 0, misses: 0, hit_rate: 0.0 },
            authenticated: true,
            checked_at: Utc::now(),
        }
    }
}
