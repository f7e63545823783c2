//! User configuration for geozone
//!
//! Stored as JSON next to other per-user config and read once at startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use geozone_core::ZoneColor;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Get the default storage path for the shape file
pub fn default_data_path() -> PathBuf {
    // Use XDG data directory if available, otherwise fallback to ~/.local/share
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local/share")
        });
    data_dir.join("geozone").join("shapes.json")
}

/// Get the config file path
pub fn default_config_path() -> PathBuf {
    let config_dir = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
    config_dir.join("geozone").join("config.json")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Durable shape file
    pub data_path: PathBuf,
    pub overlay_debounce_ms: u64,
    pub list_debounce_ms: u64,
    /// Bound on each remote call during sync
    pub sync_timeout_secs: u64,
    /// Bound on each read or write of the shape file
    pub io_timeout_secs: u64,
    /// JSON file shared between devices; no sync when unset
    pub remote_path: Option<PathBuf>,
    /// Colour given to newly drawn zones
    pub default_color: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            overlay_debounce_ms: 300,
            list_debounce_ms: 150,
            sync_timeout_secs: 15,
            io_timeout_secs: 5,
            remote_path: None,
            default_color: ZoneColor::default().to_hex().to_string(),
        }
    }
}

impl Config {
    /// Load from the default location
    pub fn load() -> Self {
        Self::load_from(&default_config_path())
    }

    /// Load from `path`; a missing file gives defaults, an unreadable one
    /// gives defaults and a warning
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::read(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = ?e, "ignoring unreadable config");
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Save to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn overlay_debounce(&self) -> Duration {
        Duration::from_millis(self.overlay_debounce_ms)
    }

    pub fn list_debounce(&self) -> Duration {
        Duration::from_millis(self.list_debounce_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}
