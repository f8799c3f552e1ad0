//! Centralized path configuration for graft.

use std::path::PathBuf;

/// Get the graft configuration directory.
///
/// Resolution order:
/// 1. `GRAFT_CONFIG_DIR` environment variable
/// 2. `~/.graft`
/// 3. `.graft` relative to the working directory when there is no home
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("GRAFT_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir().map(|h| h.join(".graft")).unwrap_or_else(|| PathBuf::from(".graft"))
}

/// Get the configuration file path. `GRAFT_CONFIG` overrides it.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("GRAFT_CONFIG") {
        return PathBuf::from(path);
    }
    config_dir().join("config.json")
}
