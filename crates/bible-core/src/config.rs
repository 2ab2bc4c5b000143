//! Configuration types for the bible reader.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Local store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Remote (canonical) database configuration.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Sync configuration.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Local store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the local SQLite file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Enable WAL mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,

    /// SQLite cache size (negative = KB, positive = pages).
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            wal_mode: true,
            busy_timeout_ms: 30000,
            cache_size: -16000, // 16MB
        }
    }
}

/// Remote database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Path to the canonical relational database.
    #[serde(default = "default_remote_path")]
    pub path: PathBuf,

    /// Upper bound for a single remote request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            path: default_remote_path(),
            timeout_secs: 15,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum number of results.
    #[serde(default = "default_search_limit")]
    pub limit: usize,

    /// Queries shorter than this (in characters) return nothing.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 50,
            min_query_chars: 2,
        }
    }
}

/// Sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run the one-time sync before reads when it has not completed yet.
    #[serde(default)]
    pub auto_sync: bool,
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_busy_timeout() -> u32 {
    30000
}

fn default_cache_size() -> i32 {
    -16000
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_search_limit() -> usize {
    50
}

fn default_min_query_chars() -> usize {
    2
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bible-reader")
}

fn default_store_path() -> PathBuf {
    data_dir().join("local.db")
}

fn default_remote_path() -> PathBuf {
    data_dir().join("remote.db")
}

impl ReaderConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content).map_err(|e| crate::error::BibleError::Config {
            message: format!("Failed to parse config: {}", e),
        })
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("bible-reader").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("bible-reader.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}
