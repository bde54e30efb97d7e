//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use bluewing_core::SessionConfig;

/// Default scan duration in seconds.
pub const DEFAULT_SCAN_SECS: u64 = 10;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Settings passed to every session
    #[serde(default)]
    pub session: SessionConfig,

    /// Scan command defaults
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Defaults for the `scan` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Scan duration in seconds
    #[serde(default = "default_scan_secs")]
    pub duration: u64,
}

fn default_scan_secs() -> u64 {
    DEFAULT_SCAN_SECS
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_SCAN_SECS,
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bluewing")
            .join("config.toml")
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, warning and falling back to defaults on failure
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(config) => match config.session.validate() {
                        Ok(()) => return config,
                        Err(e) => eprintln!("Warning: Ignoring config: {}", e),
                    },
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluewing_core::LogLevel;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml"));
        assert_eq!(config, Config::default());
        assert_eq!(config.scan.duration, DEFAULT_SCAN_SECS);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.session.log_level = LogLevel::Debug;
        config.scan.duration = 3;

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[session]\nservice_filter = \"0000180f-0000-1000-8000-00805f9b34fb\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(
            config.session.service_filter,
            Some(bluewing_types::uuids::BATTERY_SERVICE)
        );
        assert_eq!(config.session.log_level, LogLevel::None);
        assert_eq!(config.scan.duration, DEFAULT_SCAN_SECS);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[session]\nevent_capacity = 0\n").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());

        fs::write(&path, "not = [valid").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }
}
