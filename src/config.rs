//! Pipeline configuration.
//!
//! Settings live in a JSON file (by default under the user's local data
//! directory). Credentials and the model command may also come from the
//! environment; an explicit CLI value beats the environment, which beats
//! the file.
use crate::geo::nominatim::DEFAULT_NOMINATIM_URL;
use crate::geo::CityOverride;
use crate::model::http::{DEFAULT_MODEL, DEFAULT_MODEL_URL};
use crate::store::DEFAULT_DEDUP_TOLERANCE;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const APP_DIR: &str = "poi-ingest";

pub const ENV_MODEL_API_KEY: &str = "POI_INGEST_MODEL_API_KEY";
pub const ENV_GOOGLE_API_KEY: &str = "POI_INGEST_GOOGLE_API_KEY";
pub const ENV_MODEL_COMMAND: &str = "POI_INGEST_MODEL_COMMAND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelBackend {
    #[default]
    Http,
    Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: ModelBackend,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::Http,
            base_url: DEFAULT_MODEL_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            command: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_api_key: Option<String>,
    pub language: String,
    pub nominatim_url: String,
    /// Nominatim's usage policy requires an identifying user agent.
    pub user_agent: String,
    pub fallback_enabled: bool,
    /// Extra coordinate-range overrides, checked before the defaults.
    pub overrides: Vec<CityOverride>,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            google_api_key: None,
            language: "bs".to_string(),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: format!("{APP_DIR}/{}", env!("CARGO_PKG_VERSION")),
            fallback_enabled: true,
            overrides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub places_path: PathBuf,
    pub review_queue_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub schema_version: u32,
    /// Only promote places whose city was verified by geocoding.
    #[serde(default = "default_strict")]
    pub strict: bool,
    #[serde(default = "default_dedup_tolerance")]
    pub dedup_tolerance: f64,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    pub storage: StorageConfig,
}

fn default_strict() -> bool {
    true
}

fn default_dedup_tolerance() -> f64 {
    DEFAULT_DEDUP_TOLERANCE
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unsupported config schema_version {0}")]
    UnsupportedSchema(u32),
    #[error("{0} must be non-empty")]
    EmptyValue(&'static str),
    #[error("dedup_tolerance must be a finite non-negative number of degrees (got {0})")]
    InvalidTolerance(f64),
    #[error("override for {city:?} has an inverted or empty coordinate range")]
    InvertedOverride { city: String },
    #[error("model backend \"command\" needs model.command or POI_INGEST_MODEL_COMMAND")]
    MissingModelCommand,
}

/// Directory holding the config and default data files.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cannot determine a local data directory"))?;
    Ok(base.join(APP_DIR))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(default_data_dir()?.join("config.json"))
}

/// Build the default config with data files under `data_dir`.
pub fn default_config(data_dir: &Path) -> Config {
    Config {
        schema_version: CONFIG_SCHEMA_VERSION,
        strict: true,
        dedup_tolerance: DEFAULT_DEDUP_TOLERANCE,
        model: ModelConfig::default(),
        geocoding: GeocodingConfig::default(),
        storage: StorageConfig {
            places_path: data_dir.join("places.jsonl"),
            review_queue_path: data_dir.join("review_queue.jsonl"),
        },
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: Config = serde_json::from_slice(&bytes).context("parse config JSON")?;
    Ok(config)
}

/// Load `path` if it exists, else the defaults for the path's directory.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }
    tracing::debug!(path = %path.display(), "config not found; using defaults");
    let data_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => default_data_dir()?,
    };
    Ok(default_config(&data_dir))
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("create config dir")?;
        }
    }
    let text = serde_json::to_string_pretty(config).context("serialize config")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(ConfigError::UnsupportedSchema(config.schema_version));
    }
    if config.storage.places_path.as_os_str().is_empty() {
        return Err(ConfigError::EmptyValue("storage.places_path"));
    }
    if config.storage.review_queue_path.as_os_str().is_empty() {
        return Err(ConfigError::EmptyValue("storage.review_queue_path"));
    }
    if !config.dedup_tolerance.is_finite() || config.dedup_tolerance < 0.0 {
        return Err(ConfigError::InvalidTolerance(config.dedup_tolerance));
    }
    if config.model.model.trim().is_empty() {
        return Err(ConfigError::EmptyValue("model.model"));
    }
    if config.geocoding.user_agent.trim().is_empty() {
        return Err(ConfigError::EmptyValue("geocoding.user_agent"));
    }
    for entry in &config.geocoding.overrides {
        if entry.city.trim().is_empty() {
            return Err(ConfigError::EmptyValue("override city"));
        }
        if entry.min_lat >= entry.max_lat || entry.min_lng >= entry.max_lng {
            return Err(ConfigError::InvertedOverride {
                city: entry.city.clone(),
            });
        }
    }
    Ok(())
}

/// Config overrides, then the built-in override table.
pub fn effective_overrides(config: &Config) -> Vec<CityOverride> {
    let mut overrides = config.geocoding.overrides.clone();
    overrides.extend(crate::geo::city::default_overrides());
    overrides
}

/// Pick the first non-empty value: explicit, environment, then file.
pub fn resolve_setting(
    explicit: Option<&str>,
    env_value: Option<String>,
    file_value: Option<&str>,
) -> Option<String> {
    let non_empty = |value: &str| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };
    explicit
        .and_then(non_empty)
        .or_else(|| env_value.as_deref().and_then(non_empty))
        .or_else(|| file_value.and_then(non_empty))
}

pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

pub fn model_api_key(config: &Config, explicit: Option<&str>) -> Option<String> {
    resolve_setting(
        explicit,
        env_var(ENV_MODEL_API_KEY),
        config.model.api_key.as_deref(),
    )
}

pub fn google_api_key(config: &Config, explicit: Option<&str>) -> Option<String> {
    resolve_setting(
        explicit,
        env_var(ENV_GOOGLE_API_KEY),
        config.geocoding.google_api_key.as_deref(),
    )
}

pub fn model_command(config: &Config, explicit: Option<&str>) -> Option<String> {
    resolve_setting(
        explicit,
        env_var(ENV_MODEL_COMMAND),
        config.model.command.as_deref(),
    )
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
