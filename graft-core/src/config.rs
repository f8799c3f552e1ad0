//! Configuration management.
//!
//! Values are layered: built-in defaults, then the config file, then
//! environment variables, then command-line flags applied by the caller.

use crate::client::{ClientConfig, Endpoint, DEFAULT_ADDR};
use crate::error::{GraftError, Result};
use crate::paths;
use crate::session::{SessionConfig, SideChannelPolicy, DEFAULT_STATUS_BUFFER};
use crate::status::ProgressMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persistent configuration for graft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Executor address, `tcp://host:port` or `unix:///path`.
    pub addr: String,
    pub connect_timeout_secs: u64,
    /// Solve deadline. Unset waits indefinitely.
    pub timeout_secs: Option<u64>,
    pub side_channel: SideChannelPolicy,
    pub progress: ProgressMode,
    pub status_buffer: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            connect_timeout_secs: 10,
            timeout_secs: None,
            side_channel: SideChannelPolicy::Fail,
            progress: ProgressMode::Auto,
            status_buffer: DEFAULT_STATUS_BUFFER,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        paths::config_path()
    }

    /// Load configuration from the default location and apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from `path` without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| GraftError::IoError { path: path.to_path_buf(), source: e })?;
        serde_json::from_str(&content).map_err(|e| GraftError::InvalidConfig {
            reason: format!("Failed to parse config {}: {}", path.display(), e),
        })
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GraftError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| GraftError::InvalidConfig {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content)
            .map_err(|e| GraftError::IoError { path: path.to_path_buf(), source: e })
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Apply `GRAFT_ADDR` and `GRAFT_TIMEOUT` from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(
            std::env::var("GRAFT_ADDR").ok().as_deref(),
            std::env::var("GRAFT_TIMEOUT").ok().as_deref(),
        )
    }

    /// Apply address and timeout overrides given as strings.
    pub fn apply_overrides(&mut self, addr: Option<&str>, timeout: Option<&str>) -> Result<()> {
        if let Some(addr) = addr.filter(|a| !a.is_empty()) {
            self.addr = addr.to_string();
        }
        if let Some(timeout) = timeout.filter(|t| !t.is_empty()) {
            let secs = timeout.parse::<u64>().map_err(|_| GraftError::InvalidConfig {
                reason: format!("timeout must be a whole number of seconds, got {:?}", timeout),
            })?;
            self.timeout_secs = (secs > 0).then_some(secs);
        }
        Ok(())
    }

    /// Resolve into the settings of one run.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let endpoint: Endpoint = self.addr.parse()?;
        if self.status_buffer == 0 {
            return Err(GraftError::InvalidConfig {
                reason: "status_buffer must be at least 1".to_string(),
            });
        }
        Ok(SessionConfig {
            client: ClientConfig {
                endpoint,
                connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            },
            timeout: self.timeout_secs.map(Duration::from_secs),
            side_channel: self.side_channel,
            status_buffer: self.status_buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.addr, "tcp://127.0.0.1:8372");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            addr: "unix:///run/buildkit.sock".to_string(),
            timeout_secs: Some(600),
            side_channel: SideChannelPolicy::Warn,
            progress: ProgressMode::Plain,
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_default_location_follows_graft_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graft").join("config.json");
        std::env::set_var("GRAFT_CONFIG", &path);

        let config =
            Config { status_buffer: 8, log_level: "debug".to_string(), ..Default::default() };
        config.save().unwrap();
        assert!(path.exists());

        let loaded = Config::load().unwrap();
        std::env::remove_var("GRAFT_CONFIG");
        assert_eq!(loaded.status_buffer, 8);
        assert_eq!(loaded.log_level, "debug");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"progress": "quiet"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.progress, ProgressMode::Quiet);
        assert_eq!(config.status_buffer, DEFAULT_STATUS_BUFFER);
    }

    #[test]
    fn test_malformed_file_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(Config::load_from(&path), Err(GraftError::InvalidConfig { .. })));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(Some("tcp://10.0.0.2:1234"), Some("30")).unwrap();
        assert_eq!(config.addr, "tcp://10.0.0.2:1234");
        assert_eq!(config.timeout_secs, Some(30));

        config.apply_overrides(None, Some("0")).unwrap();
        assert_eq!(config.timeout_secs, None);

        assert!(config.apply_overrides(None, Some("soon")).is_err());
    }

    #[test]
    fn test_session_config() {
        let config = Config { timeout_secs: Some(5), ..Default::default() };
        let session = config.session_config().unwrap();
        assert_eq!(session.client.endpoint, Endpoint::Tcp("127.0.0.1:8372".to_string()));
        assert_eq!(session.timeout, Some(Duration::from_secs(5)));

        let bad = Config { addr: "localhost".to_string(), ..Default::default() };
        assert!(matches!(bad.session_config(), Err(GraftError::InvalidEndpoint { .. })));
    }
}
