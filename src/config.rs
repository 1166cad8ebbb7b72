//! Pipeline configuration.
//!
//! Handles loading, validating, and merging `derivatives.toml`. Stock
//! defaults are the base layer, the user file is merged on top, and two
//! environment variables override the upload locations last:
//!
//! ```text
//! stock defaults → derivatives.toml → UPLOADS_FS_BASE / UPLOADS_PUBLIC_BASE
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [uploads]
//! fs_base = "uploads"        # Directory holding uploaded sources
//! public_base = "/uploads"   # URL prefix stored in image records
//!
//! [processing]
//! max_processes = 4          # Max parallel workers (omit for auto = CPU cores)
//!
//! [backfill]
//! verify_source_hash = false # Regenerate sources replaced in place
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Overrides `uploads.fs_base`.
pub const ENV_FS_BASE: &str = "UPLOADS_FS_BASE";
/// Overrides `uploads.public_base`.
pub const ENV_PUBLIC_BASE: &str = "UPLOADS_PUBLIC_BASE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `derivatives.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DerivativesConfig {
    /// Where uploads live on disk and under which URL they are served.
    pub uploads: UploadsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Backfill skip policy.
    pub backfill: BackfillConfig,
}

impl DerivativesConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uploads.fs_base.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "uploads.fs_base must not be empty".into(),
            ));
        }
        if !self.uploads.public_base.starts_with('/') {
            return Err(ConfigError::Validation(
                "uploads.public_base must start with '/'".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Apply environment overrides through `lookup`. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup(ENV_FS_BASE).filter(|v| !v.is_empty()) {
            self.uploads.fs_base = PathBuf::from(base);
        }
        if let Some(public) = lookup(ENV_PUBLIC_BASE).filter(|v| !v.is_empty()) {
            self.uploads.public_base = public;
        }
    }
}

/// Upload locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Filesystem directory uploads are stored under.
    pub fs_base: PathBuf,
    /// URL prefix of stored image paths, stripped before joining onto
    /// `fs_base`.
    pub public_base: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            fs_base: PathBuf::from("uploads"),
            public_base: "/uploads".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Backfill skip policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackfillConfig {
    /// Also compare source content hashes before skipping an image.
    pub verify_source_hash: bool,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(DerivativesConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value and deserialize.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<DerivativesConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    Ok(merged.try_into()?)
}

/// Load config from `path` (optional) with environment overrides applied.
pub fn load_config(path: &Path) -> Result<DerivativesConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with_env(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<DerivativesConfig, ConfigError> {
    let overlay = load_raw_config(path)?;
    if overlay.is_none() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
    }
    let mut config = resolve_config(stock_defaults_value(), overlay)?;
    config.apply_env(lookup);
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `derivatives.toml` with all keys.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Responsive Derivatives Configuration
# ====================================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Upload locations
# ---------------------------------------------------------------------------
[uploads]
# Directory holding uploaded source images. Derivatives are written next to
# their source. Overridden by the UPLOADS_FS_BASE environment variable.
fs_base = "uploads"

# URL prefix under which image records store their paths, e.g.
# "/uploads/properties/12/livingroom.jpg". It is stripped before the rest of
# the path is joined onto fs_base. Overridden by UPLOADS_PUBLIC_BASE.
public_base = "/uploads"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image workers. Omit for auto (= number of CPU cores).
# Values larger than the core count are clamped down.
# max_processes = 4

# ---------------------------------------------------------------------------
# Backfill
# ---------------------------------------------------------------------------
[backfill]
# By default an image is skipped when any of its derivatives exists. With
# this enabled the source content hash must also match the last run, so
# images replaced in place under the same name are regenerated.
verify_source_hash = false
"##
}
