// Privacy Guard — Configuration
//
// TOML configuration for the daemon and the CLI client. Every field has a
// default, so a missing file or a partial file both yield a usable config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::DEFAULT_SOCKET_PATH;
use crate::privacy::{default_privacy_map, StaticPrivacyMap};

pub const DEFAULT_NOTIFY_SOCKET_PATH: &str = "/tmp/privacy_guard_notify";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write config: {0}")]
    Write(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for draining the access-decision monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Events buffered before a batch is handed to the pipeline.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Sleep after a failed fetch before trying again.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Prefix stripped from actor labels to recover the package id.
    #[serde(default = "default_actor_prefix")]
    pub actor_prefix: String,
}

fn default_buffer_size() -> usize {
    100
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_actor_prefix() -> String {
    "User::App::".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            backoff_ms: default_backoff_ms(),
            actor_prefix: default_actor_prefix(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardConfig {
    /// RPC socket served by the daemon.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Socket on which policy-change notifications are published.
    #[serde(default = "default_notify_socket_path")]
    pub notify_socket_path: PathBuf,

    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// File mode applied to both sockets.
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,

    /// Pending access logs flushed in one RPC once this many accumulate.
    #[serde(default = "default_log_batch_size")]
    pub log_batch_size: usize,

    /// User id the CLI acts as when none is given.
    #[serde(default = "default_user_id")]
    pub user_id: i32,

    /// Fallback tracing filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Privacy category → privileges.
    #[serde(default = "default_privacy_map")]
    pub privacy_map: BTreeMap<String, Vec<String>>,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_notify_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_NOTIFY_SOCKET_PATH)
}

fn default_db_path() -> PathBuf {
    data_dir().join("privacy_guard.db")
}

fn default_socket_mode() -> u32 {
    0o666
}

fn default_log_batch_size() -> usize {
    10
}

fn default_user_id() -> i32 {
    1
}

fn default_log_level() -> String {
    "privacy_guard=info".to_string()
}

/// Default directory for Privacy Guard data files.
fn data_dir() -> PathBuf {
    let base = dirs_next::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("privacy-guard")
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            notify_socket_path: default_notify_socket_path(),
            db_path: default_db_path(),
            socket_mode: default_socket_mode(),
            log_batch_size: default_log_batch_size(),
            user_id: default_user_id(),
            log_level: default_log_level(),
            monitor: MonitorConfig::default(),
            privacy_map: default_privacy_map(),
        }
    }
}

impl GuardConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: GuardConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_batch_size == 0 {
            return Err(ConfigError::Invalid("log_batch_size must be > 0".into()));
        }
        if self.monitor.buffer_size == 0 {
            return Err(ConfigError::Invalid("monitor.buffer_size must be > 0".into()));
        }
        if self.monitor.backoff_ms == 0 || self.monitor.backoff_ms > 60_000 {
            return Err(ConfigError::Invalid(format!(
                "monitor.backoff_ms must be between 1 and 60000, got {}",
                self.monitor.backoff_ms
            )));
        }
        if self.socket_mode > 0o777 {
            return Err(ConfigError::Invalid(format!(
                "socket_mode must be a permission mode (<= 0o777), got {:o}",
                self.socket_mode
            )));
        }
        if self.socket_path == self.notify_socket_path {
            return Err(ConfigError::Invalid(
                "socket_path and notify_socket_path must differ".into(),
            ));
        }
        if self.privacy_map.is_empty() {
            return Err(ConfigError::Invalid("privacy_map must not be empty".into()));
        }
        Ok(())
    }

    pub fn privacy_mapper(&self) -> StaticPrivacyMap {
        StaticPrivacyMap::new(&self.privacy_map)
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        let base = dirs_next::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("privacy-guard").join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privacy::PrivacyMapper;

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/privacy_guard_server"));
        assert_eq!(config.log_batch_size, 10);
        assert_eq!(config.monitor.buffer_size, 100);
        assert_eq!(config.monitor.actor_prefix, "User::App::");
        assert!(config.db_path.ends_with("privacy-guard/privacy_guard.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = GuardConfig::from_toml(
            r#"
            socket_path = "/run/pg.sock"
            log_batch_size = 3

            [monitor]
            backoff_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/run/pg.sock"));
        assert_eq!(config.log_batch_size, 3);
        assert_eq!(config.monitor.backoff_ms, 250);
        assert_eq!(config.monitor.buffer_size, 100);
        assert_eq!(config.privacy_map.len(), 5);
    }

    #[test]
    fn test_custom_privacy_map() {
        let config = GuardConfig::from_toml(
            r#"
            [privacy_map]
            "http://example.org/privacy/camera" = ["http://example.org/privilege/camera"]
            "#,
        )
        .unwrap();
        let mapper = config.privacy_mapper();
        assert_eq!(
            mapper.privacy_id("http://example.org/privilege/camera"),
            Some("http://example.org/privacy/camera")
        );
        assert!(!mapper.is_valid_privacy_id("http://tizen.org/privacy/location"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(GuardConfig::from_toml("log_batch_size = 0").is_err());
        assert!(GuardConfig::from_toml("[monitor]\nbuffer_size = 0").is_err());
        assert!(GuardConfig::from_toml("[monitor]\nbackoff_ms = 0").is_err());
        assert!(GuardConfig::from_toml("socket_mode = 4096").is_err());
        assert!(GuardConfig::from_toml(
            "socket_path = \"/tmp/x\"\nnotify_socket_path = \"/tmp/x\""
        )
        .is_err());
    }

    #[test]
    fn test_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GuardConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, GuardConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");
        let mut config = GuardConfig::default();
        config.user_id = 5001;
        config.monitor.actor_prefix = "Pkg::".to_string();
        config.save(&path).unwrap();

        let loaded = GuardConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
