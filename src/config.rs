// src/config.rs

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::models::DEFAULT_TIMEOUT;
use crate::logging::project_directory;

const CONFIG_FILE: &str = "config.json";

/// Persisted defaults. Command-line flags always take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_secs: Option<u64>,
    pub enable_ports: bool,
}

/// `<config dir>/config.json`, when a home directory can be determined.
pub fn config_path() -> Option<PathBuf> {
    project_directory().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

impl Config {
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Reads the config at `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(data) => {
                debug!(path = %path.display(), "Loaded configuration.");
                serde_json::from_str(&data).wrap_err_with(|| format!("invalid config file {}", path.display()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).wrap_err_with(|| format!("failed to read {}", path.display())),
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path().ok_or_else(|| color_eyre::eyre::eyre!("cannot determine config directory"))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).wrap_err_with(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "Saved configuration.");
        Ok(())
    }

    /// Removes the config file at `path`. Returns `false` if there was none.
    pub fn clear_at(path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).wrap_err_with(|| format!("failed to remove {}", path.display())),
        }
    }

    pub fn clear() -> Result<bool> {
        let path = config_path().ok_or_else(|| color_eyre::eyre::eyre!("cannot determine config directory"))?;
        Self::clear_at(&path)
    }

    pub fn timeout(&self) -> Duration {
        self.default_timeout_secs.map(Duration::from_secs).unwrap_or(DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("netgaze-config-{}-{name}", std::process::id()))
            .join(CONFIG_FILE)
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from(&scratch("missing")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn saves_loads_and_clears() {
        let path = scratch("cycle");
        let config = Config { default_timeout_secs: Some(30), enable_ports: true };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.timeout(), Duration::from_secs(30));

        assert!(Config::clear_at(&path).unwrap());
        assert!(!Config::clear_at(&path).unwrap());
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn rejects_malformed_files() {
        let path = scratch("malformed");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn unknown_and_missing_keys_are_tolerated() {
        let config: Config = serde_json::from_str(r#"{"enable_ports": true, "legacy_api_key": "x"}"#).unwrap();
        assert!(config.enable_ports);
        assert_eq!(config.default_timeout_secs, None);
    }
}
