//! Conversions from resilience and transport errors into domain errors.

use erpshield_common::resilience::ConfigError;
use erpshield_common::{PoolError, ResilienceError, RetryError, TimeoutError};
use erpshield_domain::ShieldError;
use reqwest::Error as HttpError;

/// Collapse an infrastructure error into the domain taxonomy.
pub trait IntoShieldError {
    fn into_shield(self) -> ShieldError;
}

impl IntoShieldError for ShieldError {
    fn into_shield(self) -> ShieldError {
        self
    }
}

/* -------------------------------------------------------------------------- */
/* Resilience primitives → ShieldError */
/* -------------------------------------------------------------------------- */

impl IntoShieldError for ResilienceError<ShieldError> {
    fn into_shield(self) -> ShieldError {
        let seconds_until_retry = self.seconds_until_retry();
        match self {
            ResilienceError::CircuitOpen { name, .. } => ShieldError::CircuitOpen {
                breaker: name,
                seconds_until_retry: seconds_until_retry.unwrap_or_default(),
            },
            ResilienceError::OperationFailed { source } => source,
        }
    }
}

impl IntoShieldError for RetryError<ShieldError> {
    fn into_shield(self) -> ShieldError {
        self.into_inner()
    }
}

impl IntoShieldError for TimeoutError {
    fn into_shield(self) -> ShieldError {
        match self {
            TimeoutError::Elapsed { label, timeout } => ShieldError::timeout(label, timeout),
            TimeoutError::Aborted { label, message } => {
                ShieldError::internal(format!("'{label}' aborted: {message}"))
            }
        }
    }
}

impl IntoShieldError for PoolError<ShieldError> {
    fn into_shield(self) -> ShieldError {
        match self {
            PoolError::AcquireTimeout { waited, pending } => {
                ShieldError::PoolAcquireTimeout { waited_ms: waited.as_millis() as u64, pending }
            }
            PoolError::Closed => ShieldError::PoolClosed,
            PoolError::Create { source } => source,
        }
    }
}

impl IntoShieldError for ConfigError {
    fn into_shield(self) -> ShieldError {
        ShieldError::config(self.to_string())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → ShieldError */
/* -------------------------------------------------------------------------- */

impl IntoShieldError for HttpError {
    fn into_shield(self) -> ShieldError {
        if self.is_timeout() {
            return ShieldError::transient("HTTP request timed out");
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return ShieldError::transient(format!("HTTP connection failure: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => ShieldError::authentication(message),
                429 | 500..=599 => ShieldError::transient(message),
                _ => ShieldError::permanent(message),
            };
        }

        if self.is_decode() {
            return ShieldError::serialization(self.to_string());
        }

        ShieldError::transient(self.to_string())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::{Client, StatusCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn circuit_open_carries_rounded_seconds() {
        let err: ResilienceError<ShieldError> = ResilienceError::CircuitOpen {
            name: "erp".into(),
            retry_after: Duration::from_millis(12_300),
        };

        match err.into_shield() {
            ShieldError::CircuitOpen { breaker, seconds_until_retry } => {
                assert_eq!(breaker, "erp");
                assert_eq!(seconds_until_retry, 13);
            }
            other => panic!("expected circuit open, got {other:?}"),
        }
    }

    #[test]
    fn operation_failure_unwraps_to_source() {
        let err = ResilienceError::OperationFailed { source: ShieldError::permanent("no such model") };
        assert_eq!(err.into_shield(), ShieldError::permanent("no such model"));

        let err = RetryError::Exhausted { attempts: 3, source: ShieldError::transient("reset") };
        assert_eq!(err.into_shield(), ShieldError::transient("reset"));
    }

    #[test]
    fn elapsed_deadline_maps_to_timeout() {
        let err = TimeoutError::Elapsed { label: "crm.stage.search_read".into(), timeout: Duration::from_secs(30) };
        assert_eq!(
            err.into_shield(),
            ShieldError::Timeout { label: "crm.stage.search_read".into(), timeout_ms: 30_000 }
        );
    }

    #[test]
    fn pool_errors_map_to_pool_variants() {
        let err: PoolError<ShieldError> =
            PoolError::AcquireTimeout { waited: Duration::from_millis(10_000), pending: 2 };
        assert_eq!(err.into_shield(), ShieldError::PoolAcquireTimeout { waited_ms: 10_000, pending: 2 });
        assert_eq!(PoolError::<ShieldError>::Closed.into_shield(), ShieldError::PoolClosed);

        let err = PoolError::Create { source: ShieldError::transient("refused") };
        assert!(err.into_shield().is_retryable());
    }

    #[tokio::test]
    async fn http_status_503_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::SERVICE_UNAVAILABLE))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        match error.into_shield() {
            ShieldError::Transient { message } => assert!(message.contains("503")),
            other => panic!("expected transient error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_status_403_is_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::FORBIDDEN))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        assert!(error.into_shield().is_authentication());
    }
}
