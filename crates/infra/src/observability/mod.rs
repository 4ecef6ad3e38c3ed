//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence over the configured level so operators can
//! raise verbosity without touching the config file.

use std::io;

use erpshield_domain::{LoggingConfig, Result, ShieldError};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the level filter for `config`.
///
/// # Errors
/// Returns `ShieldError::Config` when the configured directive is invalid.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ShieldError::config(format!("Invalid log filter '{}': {e}", config.level)))
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed, which makes the
/// call safe to repeat from tests and embedding applications.
///
/// # Errors
/// Returns `ShieldError::Config` when the configured level does not parse.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_span_events(FmtSpan::NONE)
                    .with_writer(io::stderr),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .compact()
                    .with_writer(io::stderr),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::debug!(level = %config.level, json = config.json, "tracing initialised");
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_directive_is_config_error() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig { level: "erpshield=[[".to_string(), json: false };
        assert!(matches!(env_filter(&config), Err(ShieldError::Config { .. })));
    }

    #[test]
    fn second_init_is_a_no_op() {
        let config = LoggingConfig::default();
        init_tracing(&config).unwrap();
        assert!(!init_tracing(&config).unwrap());
    }
}
