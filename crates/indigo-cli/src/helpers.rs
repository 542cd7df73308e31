//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, config loading and JSON argument
//! parsing.

use std::path::Path;

use anyhow::{Context, Result, bail};
use indigo_store::{Entity, StorageConfig};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Storage location used when no config file exists.
pub const DEFAULT_STORAGE_PATH: &str = "data/storage";

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so stdout carries only the JSON result.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Load the storage config from `path`, falling back to a file store under
/// [`DEFAULT_STORAGE_PATH`] when the file is missing. Environment overrides
/// are applied last.
pub fn load_config(path: &Path) -> Result<StorageConfig> {
    let mut config = if path.exists() {
        StorageConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?
    } else {
        warn!(
            path = %path.display(),
            "config file not found, using file storage at {DEFAULT_STORAGE_PATH}"
        );
        StorageConfig::file(DEFAULT_STORAGE_PATH)
    };
    config
        .apply_env_overrides()
        .context("invalid storage environment override")?;
    config.validate().context("invalid storage config")?;
    info!(backend = %config.kind, "storage config loaded");
    Ok(config)
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Parse a command-line JSON argument that must be an object.
pub fn parse_entity(raw: &str) -> Result<Entity> {
    let value: Value = serde_json::from_str(raw).context("argument is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, got {other}"),
    }
}
