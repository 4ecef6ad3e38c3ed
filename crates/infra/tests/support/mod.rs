//! Shared fixtures for infra integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use erpshield_core::{Credentials, RpcCall, RpcTransport};
use erpshield_domain::{Config, Result, ShieldError};
use serde_json::{json, Value};

pub const UID: i64 = 7;

/// A session handed out by [`FakeTransport`].
#[derive(Debug)]
pub struct FakeSession {
    pub id: usize,
}

#[derive(Default)]
struct FakeState {
    /// Fixed answer per model, used for any method not handled below
    responses: Mutex<HashMap<String, Value>>,
    /// Records served by `search_count`/`search_read` paging
    records: Mutex<HashMap<String, Vec<Value>>>,
    /// `search_count` answers that disagree with the served records
    reported_counts: Mutex<HashMap<String, u64>>,
    /// Errors returned before the model answers normally
    failures: Mutex<HashMap<String, VecDeque<ShieldError>>>,
    calls: Mutex<Vec<String>>,
    sessions_opened: AtomicUsize,
    logins: AtomicUsize,
    pings: AtomicUsize,
    unreachable: AtomicBool,
    call_delay: Mutex<Option<Duration>>,
}

/// In-memory backend. Clones share state, so a test keeps one clone and
/// hands the other to the client.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<FakeState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, model: &str, value: Value) -> &Self {
        self.state.responses.lock().unwrap().insert(model.to_string(), value);
        self
    }

    /// Serve `count` numbered records of `model` through paging calls.
    pub fn with_records(&self, model: &str, count: usize) -> &Self {
        let records = (1..=count).map(|id| json!({ "id": id, "name": format!("{model} {id}") })).collect();
        self.state.records.lock().unwrap().insert(model.to_string(), records);
        self
    }

    /// Answer `search_count` on `model` with `count` regardless of its records.
    pub fn report_count(&self, model: &str, count: u64) -> &Self {
        self.state.reported_counts.lock().unwrap().insert(model.to_string(), count);
        self
    }

    /// Queue `count` copies of `error` for calls on `model`.
    pub fn fail_next(&self, model: &str, count: usize, error: ShieldError) -> &Self {
        let mut failures = self.state.failures.lock().unwrap();
        let queue = failures.entry(model.to_string()).or_default();
        queue.extend(std::iter::repeat(error).take(count));
        self
    }

    /// Make pings and new sessions fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_call_delay(&self, delay: Option<Duration>) {
        *self.state.call_delay.lock().unwrap() = delay;
    }

    /// `model.method` of every call that reached the backend, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, label: &str) -> usize {
        self.calls().iter().filter(|call| *call == label).count()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    fn page(&self, call: &RpcCall) -> Option<Value> {
        let records = self.state.records.lock().unwrap();
        let all = records.get(&call.model)?;
        match call.method.as_str() {
            "search_count" => {
                let reported = self.state.reported_counts.lock().unwrap().get(&call.model).copied();
                Some(reported.map_or_else(|| json!(all.len()), |count| json!(count)))
            }
            "search_read" => {
                let offset = call.kwargs.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
                let limit = call.kwargs.get("limit").and_then(Value::as_u64).map_or(all.len(), |l| l as usize);
                Some(Value::Array(all.iter().skip(offset).take(limit).cloned().collect()))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl RpcTransport for FakeTransport {
    type Session = FakeSession;

    async fn open_session(&self) -> Result<FakeSession> {
        if self.state.unreachable.load(Ordering::SeqCst) {
            return Err(ShieldError::transient("connection refused"));
        }
        let id = self.state.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakeSession { id })
    }

    async fn ping(&self, _session: &FakeSession) -> bool {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        !self.state.unreachable.load(Ordering::SeqCst)
    }

    async fn login(&self, _session: &FakeSession, credentials: &Credentials) -> Result<i64> {
        self.state.logins.fetch_add(1, Ordering::SeqCst);
        if credentials.password == "wrong" {
            return Err(ShieldError::authentication("login refused"));
        }
        Ok(UID)
    }

    async fn execute_kw(
        &self,
        _session: &FakeSession,
        _credentials: &Credentials,
        uid: i64,
        call: &RpcCall,
    ) -> Result<Value> {
        assert_eq!(uid, UID, "calls must carry the logged-in uid");
        self.state.calls.lock().unwrap().push(call.label());

        let delay = *self.state.call_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.state.failures.lock().unwrap().get_mut(&call.model).and_then(VecDeque::pop_front);
        if let Some(error) = failure {
            return Err(error);
        }

        if let Some(value) = self.page(call) {
            return Ok(value);
        }
        self.state
            .responses
            .lock()
            .unwrap()
            .get(&call.model)
            .cloned()
            .ok_or_else(|| ShieldError::permanent(format!("unknown model {}", call.model)))
    }
}

/// Valid configuration with small pools and fast retries.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.backend.url = "http://erp.test".to_string();
    config.backend.database = "test".to_string();
    config.backend.username = "analytics".to_string();
    config.backend.password = "secret".to_string();
    config.backend.retry_base_delay = Duration::from_millis(10);
    config.pool.min_size = 1;
    config.pool.max_size = 2;
    config
}

pub fn stages() -> Value {
    json!([
        { "id": 1, "name": "New", "sequence": 1, "is_won": false, "fold": false, "team_id": false },
        { "id": 2, "name": "Won", "sequence": 9, "is_won": true, "fold": true, "team_id": [3, "Europe"] }
    ])
}
