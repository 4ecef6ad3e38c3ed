//! One-shot connectivity probe against the configured ERP backend.
//!
//! Run with: `erpshield-probe [config-file]`
//!
//! Loads the configuration, warms the shield up and prints the resulting
//! health snapshot as JSON on stdout. The exit code is non-zero when the
//! backend is not healthy.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use erpshield_infra::config::loader;
use erpshield_infra::container::{ContainerOptions, ShieldContainer};
use erpshield_infra::observability::init_tracing;
use serde_json::json;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Probe failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the backend came out healthy.
async fn run() -> anyhow::Result<bool> {
    let config = match env::args().nth(1) {
        Some(path) => loader::load_from_file(Some(PathBuf::from(path))),
        None => loader::load(),
    }
    .context("loading configuration")?;

    init_tracing(&config.logging).context("initialising tracing")?;

    let mut container = ShieldContainer::init(config, ContainerOptions { warm_up: true, monitor: false })
        .await
        .context("building shield container")?;

    let health = container.health();
    let report = json!({
        "health": health,
        "warm_up": container.warm_up_report(),
    });
    println!("{}", serde_json::to_string_pretty(&report).context("serialising health report")?);

    container.shutdown().await.context("shutting down")?;
    Ok(health.status.is_healthy())
}
