//! Configuration loading and discovery for `content.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::ContentConfig;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "content.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse content.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override target platform
    pub platform: Option<String>,
    /// Override target profile
    pub profile: Option<String>,
    /// Override engine timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Override temp root
    pub temp_root: Option<PathBuf>,
}

/// Find content.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for content.toml
/// 2. Check XDG_CONFIG_HOME/contentbuild/content.toml (or ~/.config/contentbuild/content.toml)
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

/// Find content.toml in XDG config directory.
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("contentbuild").join(CONFIG_FILE_NAME);
    if config_path.exists() {
        Some(config_path)
    } else {
        None
    }
}

/// Find content.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a content.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns the
/// default configuration.
///
/// # Example
/// ```ignore
/// let config = load_config(None)?;
/// let config = load_config(Some(Path::new("game/content.toml")))?;
/// ```
pub fn load_config(path: Option<&Path>) -> Result<ContentConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Load configuration from a specific file path.
///
/// A relative `workspace.temp_root` is resolved against the file's directory.
fn load_config_file(path: &Path) -> Result<ContentConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let mut config: ContentConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    if let (Some(root), Some(temp_root)) = (config_root(path), config.workspace.temp_root.as_ref()) {
        config.workspace.temp_root = Some(resolve_path(root, temp_root));
    }

    Ok(config)
}

/// Create a default configuration when no content.toml is found.
pub fn default_config() -> ContentConfig {
    ContentConfig::default()
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut ContentConfig, overrides: &CliOverrides) {
    if let Some(ref platform) = overrides.platform {
        config.build.platform = platform.clone();
    }

    if let Some(ref profile) = overrides.profile {
        config.build.profile = profile.clone();
    }

    if let Some(timeout) = overrides.timeout_secs {
        config.build.timeout_secs = Some(timeout);
    }

    if let Some(ref temp_root) = overrides.temp_root {
        config.workspace.temp_root = Some(temp_root.clone());
    }
}

/// Get the directory containing a config file.
pub fn config_root(config_path: &Path) -> Option<&Path> {
    config_path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// Resolve a path relative to a root directory.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the root.
pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
