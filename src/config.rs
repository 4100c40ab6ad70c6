//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-indexer\config.toml
//! - macOS: ~/Library/Application Support/music-indexer/config.toml
//! - Linux: ~/.config/music-indexer/config.toml
//!
//! Every section is `#[serde(default)]`, so a partial file only overrides
//! what it names.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::DEFAULT_DB_NAME;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library settings
    pub library: LibraryConfig,
}

/// Library settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root directories to index
    pub paths: Vec<PathBuf>,

    /// SQLite database file
    pub database: PathBuf,

    /// External schema script; the embedded schema is used when unset
    pub schema_path: Option<PathBuf>,

    /// Whether to watch scanned directories for changes
    pub watch_for_changes: bool,

    /// Scan pacing
    pub scan: ScanConfig,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            database: default_database_path(),
            schema_path: None,
            watch_for_changes: true,
            scan: ScanConfig::default(),
        }
    }
}

/// How fast directory walks may go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Files enqueued between two pauses
    pub files_per_operation: u64,

    /// Length of each pause, in milliseconds
    pub sleep_per_operation_ms: u64,

    /// Ignore the pacing above and walk as fast as possible
    pub fast: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            files_per_operation: 1500,
            sleep_per_operation_ms: 15,
            fast: false,
        }
    }
}

impl ScanConfig {
    /// Unthrottled scanning.
    pub fn fast() -> Self {
        Self {
            fast: true,
            ..Self::default()
        }
    }

    /// Pause after every `files_per_operation` files, if throttled at all.
    pub fn pause(&self) -> Option<(u64, Duration)> {
        if self.fast || self.files_per_operation == 0 || self.sleep_per_operation_ms == 0 {
            return None;
        }
        Some((
            self.files_per_operation,
            Duration::from_millis(self.sleep_per_operation_ms),
        ))
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-indexer"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Default database location: the OS data directory, else the working directory.
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("music-indexer").join(DEFAULT_DB_NAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_NAME))
}

/// Load configuration from the default location.
///
/// Returns default config if the file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit file.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config =
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[library]"));
        assert!(toml.contains("[library.scan]"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[library]
paths = ["/music"]

[library.scan]
fast = true
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.library.paths, vec![PathBuf::from("/music")]);
        assert!(config.library.watch_for_changes);
        assert!(config.library.scan.fast);
        assert_eq!(config.library.scan.files_per_operation, 1500);
        assert!(config.library.schema_path.is_none());
    }

    #[test]
    fn test_scan_pause() {
        assert_eq!(
            ScanConfig::default().pause(),
            Some((1500, Duration::from_millis(15)))
        );
        assert_eq!(ScanConfig::fast().pause(), None);

        let no_sleep = ScanConfig {
            sleep_per_operation_ms: 0,
            ..ScanConfig::default()
        };
        assert_eq!(no_sleep.pause(), None);
    }

    #[test]
    fn test_load_from_reports_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.toml");
        assert!(matches!(load_from(&missing), Err(ConfigError::Read(..))));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[library\npaths = 3").unwrap();
        assert!(matches!(load_from(&broken), Err(ConfigError::Parse(..))));

        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[library]\nwatch_for_changes = false\n").unwrap();
        assert!(!load_from(&good).unwrap().library.watch_for_changes);
    }
}
