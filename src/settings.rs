//! Persistent player settings (`feedplay.json`).

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::Path;

use crate::paths::{self, PathConfig};

pub const SETTINGS_FILE: &str = "feedplay.json";

/// Feed player settings
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Settings {
    // Registry
    pub registry_capacity: usize, // Live sessions kept (0 = unbounded)

    // Scrubber sampling
    pub default_sample_interval_secs: f64, // Used while duration is unknown (default 0.1)
    pub sample_tolerance_factor: f64,      // interval = factor * duration / slider width
    pub fallback_slider_width: f64,        // Used when the view reports no width

    // Playback
    pub auto_play: bool, // Start playing when a cell becomes fully visible
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry_capacity: 0,
            default_sample_interval_secs: 0.1,
            sample_tolerance_factor: 0.5,
            fallback_slider_width: 0.0,
            auto_play: true,
        }
    }
}

impl Settings {
    /// Load from `feedplay.json` in the config dir; defaults when missing or invalid.
    pub fn load(config: &PathConfig) -> Self {
        let path = paths::config_file(SETTINGS_FILE, config);
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => {
                debug!("Settings loaded from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring settings file: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Invalid settings JSON: {}", path.display()))
    }

    /// Write pretty JSON to `feedplay.json`, creating the config dir if needed.
    pub fn save(&self, config: &PathConfig) -> Result<()> {
        paths::ensure_dirs(config)?;
        let path = paths::config_file(SETTINGS_FILE, config);
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_config(name: &str) -> PathConfig {
        let dir = std::env::temp_dir().join(format!("feedplay_settings_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        PathConfig { config_dir: Some(dir) }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = temp_config("missing");
        assert_eq!(Settings::load(&config), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let config = temp_config("save");
        let settings = Settings {
            registry_capacity: 8,
            auto_play: false,
            ..Settings::default()
        };
        settings.save(&config).unwrap();
        assert_eq!(Settings::load(&config), settings);

        if let Some(dir) = &config.config_dir {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "registry_capacity": 3 }"#).unwrap();
        assert_eq!(settings.registry_capacity, 3);
        assert_eq!(settings.default_sample_interval_secs, 0.1);
        assert!(settings.auto_play);
    }

    #[test]
    fn test_invalid_json_falls_back() {
        let config = temp_config("invalid");
        let dir: PathBuf = config.config_dir.clone().unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SETTINGS_FILE), "{ not json").unwrap();

        assert!(Settings::load_from(&dir.join(SETTINGS_FILE)).is_err());
        assert_eq!(Settings::load(&config), Settings::default());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
