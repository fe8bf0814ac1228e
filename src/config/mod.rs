//! Service configuration.
//!
//! Loaded from a JSON file (`./snapcache.json` by default). Every section
//! falls back to its defaults, so `{}` is a valid config. A handful of
//! `SNAPCACHE_*` environment variables override the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::api::config::ServerConfig;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "snapcache.json";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub repository: RepositoryConfig,
    pub managed_cache: ManagedCacheConfig,
    pub logging: LoggingConfig,
}

/// Where the data file lives and whether to watch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Path to the JSON object of key → string values.
    pub path: PathBuf,
    /// Poll the file's mtime and reload on change.
    pub watch: bool,
    /// Poll interval for the watcher, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/values.json"),
            watch: false,
            poll_interval_ms: 2000,
        }
    }
}

/// Policies for the managed cache. A duration of `0` disables that policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedCacheConfig {
    /// Maximum number of entries before size-based eviction (min 1).
    pub max_capacity: u64,
    /// Entries expire this long after they were written.
    pub expire_after_write_secs: u64,
    /// Entries expire this long after they were last read.
    pub expire_after_access_secs: u64,
    /// Hits on entries older than this trigger a background reload.
    pub refresh_after_write_secs: u64,
    /// Track hit/miss/load/eviction counters.
    pub record_stats: bool,
}

impl Default for ManagedCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 500,
            expire_after_write_secs: 600,
            expire_after_access_secs: 300,
            refresh_after_write_secs: 60,
            record_stats: true,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when neither `SNAPCACHE_LOG` nor `RUST_LOG` is set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Default config path in the current directory.
    pub fn path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Load from `path`, falling back to defaults when the file is absent,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::path);
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse a config file without consulting the environment.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("SNAPCACHE_SERVER_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = lookup("SNAPCACHE_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "SNAPCACHE_SERVER_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(path) = lookup("SNAPCACHE_DATA_PATH") {
            self.repository.path = PathBuf::from(path);
        }
        if let Some(level) = lookup("SNAPCACHE_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.repository.path, PathBuf::from("data/values.json"));
        assert!(!cfg.repository.watch);
        assert_eq!(cfg.managed_cache.max_capacity, 500);
        assert!(cfg.managed_cache.record_stats);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_config_deserialize_partial() {
        let json = r#"{"managed_cache": {"max_capacity": 10}, "server": {"port": 3000}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.managed_cache.max_capacity, 10);
        assert_eq!(cfg.managed_cache.expire_after_write_secs, 600); // default
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.server.bind, "127.0.0.1");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::load(Some(&tmp.path().join("absent.json"))).unwrap();
        assert_eq!(cfg.managed_cache, ManagedCacheConfig::default());
    }

    #[test]
    fn test_load_from_path_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_overrides_applied() {
        let env: HashMap<&str, &str> = [
            ("SNAPCACHE_SERVER_PORT", "9999"),
            ("SNAPCACHE_DATA_PATH", "/tmp/values.json"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.server.port, 9999);
        assert_eq!(cfg.repository.path, PathBuf::from("/tmp/values.json"));
        assert_eq!(cfg.server.bind, "127.0.0.1");
    }

    #[test]
    fn test_invalid_port_override_rejected() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_overrides(|k| (k == "SNAPCACHE_SERVER_PORT").then(|| "nope".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}
