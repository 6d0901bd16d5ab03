//! Configuration management for threatgalaxy
//!
//! Handles loading, validation, and management of the cache and upstream
//! settings used by the galaxy store.

use crate::error::{GalaxyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Local snapshot cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the snapshot and the extracted archive
    pub dir: PathBuf,
    /// Snapshot age beyond which a refresh is triggered
    pub max_age_hours: u64,
}

impl CacheConfig {
    /// Path of the uuid -> cluster snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join("galaxy_snapshot.json")
    }

    /// Path of the advisory lock guarding snapshot rewrites
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join("galaxy_snapshot.json.lock")
    }

    /// Freshness window as a duration
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours * 60 * 60)
    }
}

/// Upstream galaxy archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// URL of the zipped galaxy repository
    pub archive_url: String,
    /// Top-level directory name inside the archive
    pub archive_root: String,
    /// HTTP timeout for the archive download
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GalaxyError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| GalaxyError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| GalaxyError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: THREATGALAXY_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("THREATGALAXY_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "CACHE__DIR" => {
                self.cache.dir = PathBuf::from(value);
            }
            "CACHE__MAX_AGE_HOURS" => {
                self.cache.max_age_hours =
                    value.parse().map_err(|_| GalaxyError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            "UPSTREAM__ARCHIVE_URL" => {
                self.upstream.archive_url = value.to_string();
            }
            "UPSTREAM__ARCHIVE_ROOT" => {
                self.upstream.archive_root = value.to_string();
            }
            "UPSTREAM__TIMEOUT_SECS" => {
                self.upstream.timeout_secs =
                    value.parse().map_err(|_| GalaxyError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| GalaxyError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("threatgalaxy").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            cache: CacheConfig {
                dir: std::env::temp_dir().join("threatgalaxy"),
                max_age_hours: 24,
            },
            upstream: UpstreamConfig {
                archive_url: "https://github.com/MISP/misp-galaxy/archive/refs/heads/main.zip"
                    .to_string(),
                archive_root: "misp-galaxy-main".to_string(),
                timeout_secs: 60,
            },
        }
    }
}
