//! Configuration for the program sync client.
//!
//! The CLI reads `programsync.toml` into [`SyncConfig`]; the sync crate only
//! consumes the already-parsed values. Every field has a default so a missing
//! file or a partial file is always usable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "programsync.toml";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV_VAR: &str = "PROGRAMSYNC_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHome,
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level configuration (persisted as `programsync.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SyncConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for list requests on 5xx and network errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ServerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    /// Entries younger than this are served without a request
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Collections at least this large are fetched with one bulk request
    #[serde(default = "default_bulk_threshold")]
    pub bulk_threshold: u64,
    #[serde(default = "default_active_key")]
    pub active_key: String,
    /// Extra keys refreshed together with the active one after a sync
    #[serde(default)]
    pub prefetch_keys: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            page_size: default_page_size(),
            bulk_threshold: default_bulk_threshold(),
            active_key: default_active_key(),
            prefetch_keys: Vec::new(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    /// Run a sync session when the orchestrator is mounted
    #[serde(default = "default_true")]
    pub sync_on_start: bool,
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
    /// Give up on a sync stream that sends nothing for this long
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
}

impl SyncSettings {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_on_start: true,
            watch_interval_secs: default_watch_interval_secs(),
            stall_timeout_secs: default_stall_timeout_secs(),
        }
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_ttl_secs() -> u64 {
    300
}
fn default_page_size() -> u64 {
    100
}
fn default_bulk_threshold() -> u64 {
    500
}
fn default_active_key() -> String {
    "CURRENT".to_string()
}
fn default_watch_interval_secs() -> u64 {
    60
}
fn default_stall_timeout_secs() -> u64 {
    120
}

impl SyncConfig {
    /// Reject values the loader cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.page_size == 0 {
            return Err(invalid("cache.page_size", "must be greater than 0"));
        }
        if self.cache.bulk_threshold == 0 {
            return Err(invalid("cache.bulk_threshold", "must be greater than 0"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(invalid("cache.ttl_secs", "must be greater than 0"));
        }
        if self.cache.active_key.trim().is_empty() {
            return Err(invalid("cache.active_key", "must not be empty"));
        }
        if self.server.url.trim().is_empty() {
            return Err(invalid("server.url", "must not be empty"));
        }
        if self.sync.watch_interval_secs == 0 {
            return Err(invalid("sync.watch_interval_secs", "must be greater than 0"));
        }
        if self.sync.stall_timeout_secs == 0 {
            return Err(invalid("sync.stall_timeout_secs", "must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| ConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(".config").join("programsync"))
}

/// Resolve the config path: explicit path, then `PROGRAMSYNC_CONFIG`, then the
/// default location.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load and validate config from `path`. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<SyncConfig, ConfigError> {
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: SyncConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(explicit: Option<&Path>) -> Result<SyncConfig, ConfigError> {
    load_config_from(&config_path(explicit)?)
}
