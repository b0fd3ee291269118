//! Service configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults
//! are the base layer; the user's file only needs the keys it overrides.
//!
//! ## Configuration Options
//!
//! ```toml
//! [storage]
//! bucket = "images"             # Required
//! region = "us-east-1"
//! endpoint = "http://localhost:9000"  # Optional, for S3-compatible stores
//! access_key_id = "..."         # Optional; must be paired with the secret
//! secret_access_key = "..."
//! server_url = "https://cdn.example.com/content/images"
//!
//! [cache]
//! folder = "cache"              # Root of the derivative cache
//! default_max_width = 1024      # Width used when a request has none
//! jpeg_quality = 80             # Quality for JPEG derivatives (1-100)
//! webp_quality = 80             # Quality for WebP derivatives (1-100)
//! max_source_bytes = 67108864   # Largest original accepted for transcoding
//!
//! [server]
//! bind = "127.0.0.1:2369"
//! max_age_secs = 864000         # Cache-Control max-age on served images
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Upstream object store connection settings.
    pub storage: StorageConfig,
    /// Derivative cache settings.
    pub cache: CacheConfig,
    /// HTTP serving settings.
    pub server: ServerConfig,
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.bucket must not be empty".into(),
            ));
        }
        if self.storage.access_key_id.is_some() != self.storage.secret_access_key.is_some() {
            return Err(ConfigError::Validation(
                "storage.access_key_id and storage.secret_access_key must be set together".into(),
            ));
        }
        if self.cache.default_max_width == 0 {
            return Err(ConfigError::Validation(
                "cache.default_max_width must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.cache.jpeg_quality) {
            return Err(ConfigError::Validation(
                "cache.jpeg_quality must be 1-100".into(),
            ));
        }
        if !(1..=100).contains(&self.cache.webp_quality) {
            return Err(ConfigError::Validation(
                "cache.webp_quality must be 1-100".into(),
            ));
        }
        if self.cache.max_source_bytes == 0 {
            return Err(ConfigError::Validation(
                "cache.max_source_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Object store connection settings, supplied once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Public base URL that uploaded keys are appended to.
    pub server_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            server_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub folder: PathBuf,
    pub default_max_width: u32,
    pub jpeg_quality: u8,
    /// Lossy WebP quality; for PNG sources, the near-lossless level.
    pub webp_quality: u8,
    pub max_source_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("cache"),
            default_max_width: 1024,
            jpeg_quality: 80,
            webp_quality: 80,
            max_source_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:2369".to_string(),
            max_age_secs: 864_000,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(ServiceConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key-by-key; any other overlay value replaces the base value.
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

/// Parse config text on top of stock defaults and validate the result.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    let merged = merge_toml(stock_defaults_value()?, overlay);
    let config: ServiceConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixcache configuration
# =====================
# Values shown are the defaults, except storage.bucket which is required.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Upstream object store
# ---------------------------------------------------------------------------
[storage]
bucket = "images"
region = "us-east-1"

# Endpoint for S3-compatible stores. Omit for AWS.
# endpoint = "http://localhost:9000"

# Static credentials. Omit both to use the default AWS credential chain.
# access_key_id = ""
# secret_access_key = ""

# Public base URL returned for uploaded files.
server_url = ""

# ---------------------------------------------------------------------------
# Derivative cache
# ---------------------------------------------------------------------------
[cache]
# Root directory of cached derivatives.
folder = "cache"

# Width applied when a request carries no width parameter.
default_max_width = 1024

# Encoding quality for JPEG derivatives (1-100).
jpeg_quality = 80

# Encoding quality for WebP derivatives (1-100). PNG sources are encoded
# near-lossless and use this as the preprocessing level instead.
webp_quality = 80

# Originals larger than this are refused for transcoding (bytes).
max_source_bytes = 67108864

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
bind = "127.0.0.1:2369"

# Cache-Control max-age for served images, in seconds (10 days).
max_age_secs = 864000
"##
}
