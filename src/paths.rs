use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "feedplay";

/// Files whose presence in the working directory makes it the config dir
const LOCAL_MARKERS: [&str; 2] = ["feedplay.json", "feedplay.log"];

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (FEEDPLAY_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var("FEEDPLAY_CONFIG_DIR").ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. FEEDPLAY_CONFIG_DIR environment variable
/// 3. Local folder IF feedplay.json or feedplay.log exist there
/// 4. Platform-specific config directory from dirs-next (default)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config_dir(config).join(name)
}

/// Get path to a data file (logs). Same priority as [`config_file`],
/// with the platform data directory as the default.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    data_dir(config).join(name)
}

/// Ensure that configuration and data directories exist
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = config_dir(config);
    let data_dir = data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    LOCAL_MARKERS.iter().any(|f| dir.join(f).exists())
}

fn resolve(config: &PathConfig, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir()
        && has_local_config_files(&current_dir)
    {
        return current_dir;
    }

    platform.map(|dir| dir.join(APP_DIR)).unwrap_or_else(|| PathBuf::from("."))
}

fn config_dir(config: &PathConfig) -> PathBuf {
    resolve(config, dirs_next::config_dir())
}

fn data_dir(config: &PathConfig) -> PathBuf {
    resolve(config, dirs_next::data_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config_file("feedplay.json", &config), PathBuf::from("/custom/feedplay.json"));
        assert_eq!(data_file("feedplay.log", &config), PathBuf::from("/custom/feedplay.log"));
    }

    #[test]
    fn test_cli_dir_wins_over_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from-cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from-cli")));
    }

    #[test]
    fn test_ensure_dirs_creates_custom_dir() {
        let dir = std::env::temp_dir().join(format!("feedplay_paths_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let config = PathConfig {
            config_dir: Some(dir.clone()),
        };

        ensure_dirs(&config).unwrap();
        assert!(dir.is_dir());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
