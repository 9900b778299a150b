//! Configuration file loading and path resolution
//!
//! Provides the shared TOML configuration model plus platform path
//! resolution. Value priority is CLI argument > environment variable >
//! TOML file > compiled default; callers pass CLI/env values down and this
//! module fills the rest.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Logging configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive (e.g. "info", "kova_batch=debug")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Shared TOML configuration file model (`kova.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Default dataset root to process
    pub dataset_root: Option<PathBuf>,
    /// Checkpoint database location; defaults to `.kova/checkpoints.db`
    /// under the dataset root when unset
    pub checkpoint_path: Option<PathBuf>,
    /// Logging section
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Resolve the dataset root following priority order:
/// 1. Command-line argument (highest priority)
/// 2. `KOVA_DATASET_ROOT` environment variable
/// 3. TOML config file
pub fn resolve_dataset_root(cli_arg: Option<&Path>, config: &TomlConfig) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("KOVA_DATASET_ROOT") {
        tracing::info!("Dataset root loaded from KOVA_DATASET_ROOT");
        return Ok(PathBuf::from(path));
    }

    if let Some(ref path) = config.dataset_root {
        tracing::info!("Dataset root loaded from TOML config");
        return Ok(path.clone());
    }

    Err(Error::Config(
        "No dataset root configured. Supply --root, set KOVA_DATASET_ROOT, \
         or add dataset_root to kova.toml"
            .to_string(),
    ))
}

/// Default configuration file path for the platform
///
/// `~/.config/kova/kova.toml` on Linux/macOS conventions via `dirs`;
/// `/etc/kova/kova.toml` as the system fallback on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("kova").join("kova.toml"));

    if let Some(ref path) = user_config {
        if path.exists() {
            return user_config;
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/kova/kova.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    user_config
}

/// Read a TOML config file, falling back to defaults when absent
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::debug!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write a TOML config file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Create config dir failed: {}", e)))?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content).map_err(|e| Error::Config(format!("Write TOML failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = read_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
        assert!(config.dataset_root.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kova.toml");

        let config = TomlConfig {
            dataset_root: Some(PathBuf::from("/data/captures")),
            checkpoint_path: None,
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
        };
        write_toml_config(&config, &path).unwrap();

        let loaded = read_toml_config(&path).unwrap();
        assert_eq!(loaded.dataset_root, Some(PathBuf::from("/data/captures")));
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn test_cli_argument_takes_priority() {
        let config = TomlConfig {
            dataset_root: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let resolved =
            resolve_dataset_root(Some(Path::new("/from/cli")), &config).unwrap();
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_unconfigured_dataset_root_is_an_error() {
        // Guard against ambient env config leaking into the assertion
        if std::env::var("KOVA_DATASET_ROOT").is_ok() {
            return;
        }
        let result = resolve_dataset_root(None, &TomlConfig::default());
        assert!(result.is_err());
    }
}
