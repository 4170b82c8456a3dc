//! Wamark configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::ReactSettings;

/// Root configuration, loaded from `~/.wamark/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WamarkConfig {
    /// Directory for the persistent JSON stores.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub react: ReactSettings,
    #[serde(default)]
    pub backlog: BacklogConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
}

fn default_data_dir() -> String {
    WamarkConfig::home_dir().join("data").to_string_lossy().into_owned()
}

impl Default for WamarkConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            react: ReactSettings::default(),
            backlog: BacklogConfig::default(),
            bulk: BulkConfig::default(),
        }
    }
}

impl WamarkConfig {
    /// Load config from the default path, or defaults if absent.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() { Self::load_from(&path) } else { Ok(Self::default()) }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::WamarkError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::WamarkError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::WamarkError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// The wamark home directory (~/.wamark).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wamark")
    }
}

/// Control-surface HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 3000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Backlog reconciliation paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklogConfig {
    /// History page size per gateway fetch.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Default cap on fetched events per conversation.
    #[serde(default = "default_limit_per_chat")]
    pub limit_per_chat: usize,
}

fn default_page_size() -> usize { 200 }
fn default_limit_per_chat() -> usize { 800 }

impl Default for BacklogConfig {
    fn default() -> Self {
        Self { page_size: default_page_size(), limit_per_chat: default_limit_per_chat() }
    }
}

/// Bulk campaign pacing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    #[serde(default = "default_bulk_delay")]
    pub delay_secs: u64,
    #[serde(default = "default_bulk_rpm")]
    pub rate_per_minute: u32,
}

fn default_bulk_delay() -> u64 { 3 }
fn default_bulk_rpm() -> u32 { 20 }

impl Default for BulkConfig {
    fn default() -> Self {
        Self { delay_secs: default_bulk_delay(), rate_per_minute: default_bulk_rpm() }
    }
}
