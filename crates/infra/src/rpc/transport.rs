//! JSON-RPC transport to the ERP backend.
//!
//! Every call is a POST of a `call` envelope to `{base_url}/jsonrpc`:
//!
//! ```text
//! {"jsonrpc": "2.0", "method": "call", "id": 7,
//!  "params": {"service": "object", "method": "execute_kw", "args": [...]}}
//! ```
//!
//! Failures are classified here so the resilience layer above only has to
//! look at [`ShieldError::is_retryable`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use erpshield_core::{Credentials, RpcCall, RpcTransport};
use erpshield_domain::{Result, ShieldError};
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::IntoShieldError;

const JSONRPC_PATH: &str = "/jsonrpc";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One HTTP client with its own connections to the backend.
pub struct RpcSession {
    id: Uuid,
    client: ReqwestClient,
    server_version: Option<String>,
    next_request_id: AtomicU64,
}

impl RpcSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Version string reported by the backend when the session was opened
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl fmt::Debug for RpcSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcSession")
            .field("id", &self.id)
            .field("server_version", &self.server_version)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<FaultData>,
}

#[derive(Debug, Default, Deserialize)]
struct FaultData {
    /// Server-side exception class, e.g. `odoo.exceptions.AccessDenied`
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

impl RpcFault {
    fn into_shield(self) -> ShieldError {
        let data = self.data.unwrap_or_default();
        let detail = if data.message.is_empty() { self.message.clone() } else { data.message };
        let text = format!("{} {} {}", data.name, self.message, detail).to_ascii_lowercase();

        if text.contains("accessdenied") || text.contains("access denied") || text.contains("session expired")
        {
            ShieldError::authentication(detail)
        } else if data.name.is_empty() {
            ShieldError::permanent(format!("JSON-RPC fault {}: {detail}", self.code))
        } else {
            ShieldError::permanent(format!("{}: {detail}", data.name))
        }
    }
}

/// [`RpcTransport`] speaking JSON-RPC over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct JsonRpcTransport {
    endpoint: String,
    request_timeout: Duration,
}

impl JsonRpcTransport {
    /// Transport for the backend at `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}{JSONRPC_PATH}", base_url.trim_end_matches('/')),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Per-request HTTP timeout. The resilience deadline still applies on top.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, session: &RpcSession, service: &str, method: &str, args: Value) -> Result<Value> {
        let request_id = session.next_request_id();
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {"service": service, "method": method, "args": args},
            "id": request_id,
        });

        debug!(session = %session.id, service, method, request_id, "sending JSON-RPC call");

        let response = session
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(IntoShieldError::into_shield)?;

        let envelope: RpcEnvelope = response.json().await.map_err(|err| {
            if err.is_decode() {
                ShieldError::serialization(format!("invalid JSON-RPC response: {err}"))
            } else {
                err.into_shield()
            }
        })?;

        match envelope.error {
            Some(fault) => {
                let error = fault.into_shield();
                debug!(session = %session.id, service, method, error = %error, "JSON-RPC fault");
                Err(error)
            }
            None => Ok(envelope.result.unwrap_or(Value::Null)),
        }
    }
}

#[async_trait]
impl RpcTransport for JsonRpcTransport {
    type Session = RpcSession;

    async fn open_session(&self) -> Result<RpcSession> {
        let client = ReqwestClient::builder()
            .timeout(self.request_timeout)
            .no_proxy()
            .build()
            .map_err(IntoShieldError::into_shield)?;

        let mut session =
            RpcSession { id: Uuid::new_v4(), client, server_version: None, next_request_id: AtomicU64::new(0) };

        let version = self.post(&session, "common", "version", json!([])).await?;
        session.server_version = version.get("server_version").and_then(Value::as_str).map(str::to_string);
        debug!(session = %session.id, version = ?session.server_version, "session opened");
        Ok(session)
    }

    async fn ping(&self, session: &RpcSession) -> bool {
        match self.post(session, "common", "version", json!([])).await {
            Ok(_) => true,
            Err(error) => {
                warn!(session = %session.id, error = %error, "session failed health probe");
                false
            }
        }
    }

    async fn login(&self, session: &RpcSession, credentials: &Credentials) -> Result<i64> {
        let result = self
            .post(
                session,
                "common",
                "login",
                json!([credentials.database, credentials.username, credentials.password]),
            )
            .await?;

        match result.as_i64() {
            Some(uid) if uid > 0 => Ok(uid),
            _ => Err(ShieldError::authentication(format!(
                "login refused for '{}' on database '{}'",
                credentials.username, credentials.database
            ))),
        }
    }

    async fn execute_kw(
        &self,
        session: &RpcSession,
        credentials: &Credentials,
        uid: i64,
        call: &RpcCall,
    ) -> Result<Value> {
        self.post(
            session,
            "object",
            "execute_kw",
            json!([
                credentials.database,
                uid,
                credentials.password,
                call.model,
                call.method,
                call.args,
                call.kwargs,
            ]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("prod", "analytics", "s3cret")
    }

    async fn server_with_version() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jsonrpc"))
            .and(body_partial_json(json!({"params": {"service": "common", "method": "version"}})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {"server_version": "17.0"}})),
            )
            .mount(&server)
            .await;
        server
    }

    fn transport(server: &MockServer) -> JsonRpcTransport {
        JsonRpcTransport::new(&format!("{}/", server.uri())).with_request_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn open_session_reads_server_version() {
        let server = server_with_version().await;
        let transport = transport(&server);

        let session = transport.open_session().await.unwrap();

        assert_eq!(session.server_version(), Some("17.0"));
        assert!(transport.ping(&session).await);
        assert!(transport.endpoint().ends_with("/jsonrpc"));
        assert!(!transport.endpoint().contains("//jsonrpc"));
    }

    #[tokio::test]
    async fn login_returns_uid_and_rejects_false() {
        let server = server_with_version().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"params": {"method": "login", "args": ["prod", "analytics", "s3cret"]}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 2, "result": 7})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"params": {"method": "login", "args": ["prod", "analytics", "wrong"]}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 3, "result": false})),
            )
            .mount(&server)
            .await;

        let transport = transport(&server);
        let session = transport.open_session().await.unwrap();

        assert_eq!(transport.login(&session, &credentials()).await.unwrap(), 7);

        let wrong = Credentials::new("prod", "analytics", "wrong");
        let err = transport.login(&session, &wrong).await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn execute_kw_sends_call_and_returns_result() {
        let server = server_with_version().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "params": {
                    "service": "object",
                    "method": "execute_kw",
                    "args": ["prod", 7, "s3cret", "crm.stage", "search_read", [[]], {"fields": ["id", "name"]}]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 2, "result": [{"id": 1, "name": "New"}]
            })))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let session = transport.open_session().await.unwrap();
        let call = RpcCall::new("crm.stage", "search_read")
            .with_args(vec![json!([])])
            .with_kwarg("fields", json!(["id", "name"]));

        let result = transport.execute_kw(&session, &credentials(), 7, &call).await.unwrap();
        assert_eq!(result, json!([{"id": 1, "name": "New"}]));
    }

    #[tokio::test]
    async fn access_denied_fault_is_authentication() {
        let server = server_with_version().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"params": {"service": "object"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "error": {
                    "code": 200,
                    "message": "Odoo Server Error",
                    "data": {"name": "odoo.exceptions.AccessDenied", "message": "Access Denied"}
                }
            })))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let session = transport.open_session().await.unwrap();
        let err = transport
            .execute_kw(&session, &credentials(), 7, &RpcCall::new("crm.stage", "search_read"))
            .await
            .unwrap_err();

        assert!(err.is_authentication());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_fault_is_permanent() {
        let server = server_with_version().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"params": {"service": "object"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "error": {
                    "code": 200,
                    "message": "Odoo Server Error",
                    "data": {"name": "builtins.ValueError", "message": "Invalid field 'bogus' on model 'crm.stage'"}
                }
            })))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let session = transport.open_session().await.unwrap();
        let err = transport
            .execute_kw(&session, &credentials(), 7, &RpcCall::new("crm.stage", "search_read"))
            .await
            .unwrap_err();

        match err {
            ShieldError::Permanent { message } => assert!(message.contains("builtins.ValueError")),
            other => panic!("expected permanent error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_gateway_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(502)).mount(&server).await;

        let err = transport(&server).open_session().await.unwrap_err();
        assert!(err.is_retryable(), "expected transient, got {err:?}");
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(429)).mount(&server).await;

        let err = transport(&server).open_session().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn html_body_is_serialization_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = transport(&server).open_session().await.unwrap_err();
        assert!(matches!(err, ShieldError::Serialization { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        let transport = JsonRpcTransport::new("http://127.0.0.1:9").with_request_timeout(Duration::from_secs(2));

        let err = transport.open_session().await.unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
    }
}
