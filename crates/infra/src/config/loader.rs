//! Configuration loader
//!
//! Loads the shield configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Whatever the source, the result is checked with [`Config::validate`].
//!
//! ## Environment Variables
//! - `ERPSHIELD_URL`: ERP base URL (required)
//! - `ERPSHIELD_DATABASE`: ERP database name (required)
//! - `ERPSHIELD_USERNAME`: Login user (required)
//! - `ERPSHIELD_PASSWORD`: Login password or API key (required)
//! - `ERPSHIELD_API_TIMEOUT_MS`: Deadline around an ordinary call
//! - `ERPSHIELD_POOL_MAX`: Maximum pooled sessions
//! - `ERPSHIELD_LOG_LEVEL`: Log filter directive
//! - `ERPSHIELD_LOG_JSON`: Emit JSON log lines (true/false)
//!
//! Every other setting keeps its default when loading from the environment.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./erpshield.json` or `./erpshield.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use erpshield_domain::{Config, Result, ShieldError};

const FILE_STEMS: [&str; 2] = ["config", "erpshield"];
const FILE_EXTENSIONS: [&str; 2] = ["json", "toml"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `ShieldError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - A value fails validation
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// The four connection variables must be present; see the module
/// documentation for the optional ones.
///
/// # Errors
/// Returns `ShieldError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.backend.url = env_var("ERPSHIELD_URL")?;
    config.backend.database = env_var("ERPSHIELD_DATABASE")?;
    config.backend.username = env_var("ERPSHIELD_USERNAME")?;
    config.backend.password = env_var("ERPSHIELD_PASSWORD")?;

    if let Some(ms) = env_parse::<u64>("ERPSHIELD_API_TIMEOUT_MS")? {
        config.backend.api_timeout = Duration::from_millis(ms);
    }
    if let Some(max) = env_parse::<usize>("ERPSHIELD_POOL_MAX")? {
        config.pool.max_size = max;
        config.pool.min_size = config.pool.min_size.min(max);
    }
    if let Ok(level) = std::env::var("ERPSHIELD_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("ERPSHIELD_LOG_JSON", config.logging.json);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `ShieldError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - A value fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ShieldError::config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ShieldError::config("No config file found in any of the standard locations")
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ShieldError::config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ShieldError::config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ShieldError::config(format!("Invalid JSON format: {e}"))),
        _ => Err(ShieldError::config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the current working directory and the executable's directory,
/// each with up to two parent levels for `config.{json,toml}`.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidates_in(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidates_in(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidates_in(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = FILE_STEMS
        .iter()
        .flat_map(|stem| FILE_EXTENSIONS.iter().map(move |ext| dir.join(format!("{stem}.{ext}"))))
        .collect();

    for parent in ["..", "../.."] {
        paths.extend(FILE_EXTENSIONS.iter().map(|ext| dir.join(parent).join(format!("config.{ext}"))));
    }
    paths
}

/// Get required environment variable
///
/// # Errors
/// Returns `ShieldError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| ShieldError::config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional environment variable.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ShieldError::config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
