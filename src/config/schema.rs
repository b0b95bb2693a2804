//! Configuration schema types for `content.toml`
//!
//! Defines the structure and validation rules for contentbuild configuration.

use crate::build::{ExtensionTable, Transform, DEFAULT_ERROR_PATTERN};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Which engine builds are submitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process engine that copies sources unchanged
    #[default]
    Passthrough,
    /// External toolchain program
    Command,
}

/// Workspace section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Tool identity; names the shared base directory under the temp root
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Temp root override (defaults to the platform temp directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { tool: default_tool(), temp_root: None }
    }
}

fn default_tool() -> String {
    "contentbuild".to_string()
}

/// Build section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Target platform passed to the engine
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Target profile passed to the engine
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Maximum time to wait for the engine, in seconds (unbounded if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { platform: default_platform(), profile: default_profile(), timeout_secs: None }
    }
}

fn default_platform() -> String {
    "DesktopGL".to_string()
}

fn default_profile() -> String {
    "HiDef".to_string()
}

/// Engine section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine implementation
    #[serde(default)]
    pub kind: EngineKind,
    /// Toolchain program (required for `kind = "command"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
    /// Argument template; supports `{project}`, `{output}`, `{intermediate}`,
    /// `{platform}` and `{profile}` placeholders
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Regex selecting error lines from toolchain output
    #[serde(default = "default_error_pattern")]
    pub error_pattern: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            program: None,
            args: default_args(),
            error_pattern: default_error_pattern(),
        }
    }
}

fn default_args() -> Vec<String> {
    crate::build::DEFAULT_ARGS.iter().map(|s| s.to_string()).collect()
}

fn default_error_pattern() -> String {
    DEFAULT_ERROR_PATTERN.to_string()
}

/// Complete content.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Workspace settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,
    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Extension overrides, merged over the built-in table
    #[serde(default)]
    pub extensions: HashMap<String, Transform>,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "engine.program")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "content.toml: '{}' {}", self.field, self.message)
    }
}

impl ContentConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        let mut components = Path::new(&self.workspace.tool).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            errors.push(ConfigValidationError {
                field: "workspace.tool".to_string(),
                message: "must be a single non-empty directory name".to_string(),
            });
        }

        if self.build.platform.is_empty() {
            errors.push(ConfigValidationError {
                field: "build.platform".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        if self.build.timeout_secs == Some(0) {
            errors.push(ConfigValidationError {
                field: "build.timeout_secs".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        if self.engine.kind == EngineKind::Command && self.engine.program.is_none() {
            errors.push(ConfigValidationError {
                field: "engine.program".to_string(),
                message: "is required when engine.kind = \"command\"".to_string(),
            });
        }

        if let Err(e) = regex::Regex::new(&self.engine.error_pattern) {
            errors.push(ConfigValidationError {
                field: "engine.error_pattern".to_string(),
                message: format!("is not a valid regex: {}", e),
            });
        }

        for (ext, transform) in &self.extensions {
            if transform.importer.is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("extensions.{}.importer", ext),
                    message: "must be a non-empty string".to_string(),
                });
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Temp root to allocate workspaces under.
    pub fn temp_root(&self) -> PathBuf {
        self.workspace.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Engine wait limit, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.build.timeout_secs.map(Duration::from_secs)
    }

    /// Built-in extension table with configured overrides applied.
    pub fn extension_table(&self) -> ExtensionTable {
        let mut table = ExtensionTable::default();
        for (ext, transform) in &self.extensions {
            table.insert(ext, transform.clone());
        }
        table
    }
}
