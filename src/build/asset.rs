//! Ordered registry of assets to build.

use crate::build::ExtensionTable;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Error type for asset registration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// No default importer/processor is known for the file extension
    #[error("No default importer for '{path}' (extension '{extension}'); specify importer and processor explicitly")]
    UnknownExtension { path: PathBuf, extension: String },
    /// A required argument is missing or empty
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// One input registered for the engine to transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Path to the source file
    pub source: PathBuf,
    /// Logical name of the compiled asset
    pub name: String,
    /// Importer name (`None` = engine auto-detects)
    pub importer: Option<String>,
    /// Processor name (`None` = pass-through)
    pub processor: Option<String>,
}

/// In-memory, insertion-ordered list of assets.
///
/// Duplicate logical names are accepted here; the engine rejects them at
/// build time, and some engines rely on registration order to decide
/// which occurrence is the duplicate.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    table: ExtensionTable,
    entries: Vec<AssetEntry>,
}

impl AssetRegistry {
    /// Create a registry that resolves defaults through `table`.
    pub fn new(table: ExtensionTable) -> Self {
        Self { table, entries: Vec::new() }
    }

    /// Register a file using the default importer/processor for its extension.
    ///
    /// The logical name is the file stem. Defaults are resolved now, not at
    /// build time.
    pub fn add_by_convention(&mut self, path: &Path) -> Result<&AssetEntry, RegistryError> {
        require_path(path)?;
        let transform = self.table.lookup(path).cloned().ok_or_else(|| {
            RegistryError::UnknownExtension {
                path: path.to_path_buf(),
                extension: path
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default(),
            }
        })?;
        let name = logical_name(path)?;

        Ok(self.push(AssetEntry {
            source: path.to_path_buf(),
            name,
            importer: Some(transform.importer),
            processor: transform.processor,
        }))
    }

    /// Register a file with an explicit logical name and optional stages.
    ///
    /// The name may contain `/` to place the output in a subdirectory, but
    /// must stay relative to the output directory.
    pub fn add_explicit(
        &mut self,
        path: &Path,
        name: &str,
        importer: Option<&str>,
        processor: Option<&str>,
    ) -> Result<&AssetEntry, RegistryError> {
        require_path(path)?;
        if name.is_empty() {
            return Err(RegistryError::InvalidArgument(format!(
                "logical name for '{}' must not be empty",
                path.display()
            )));
        }
        if !is_contained_name(name) {
            return Err(RegistryError::InvalidArgument(format!(
                "logical name '{}' must be a relative path without '..'",
                name
            )));
        }

        Ok(self.push(AssetEntry {
            source: path.to_path_buf(),
            name: name.to_string(),
            importer: importer.map(str::to_string),
            processor: processor.map(str::to_string),
        }))
    }

    /// Remove every registered asset.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Registered assets in insertion order.
    pub fn entries(&self) -> &[AssetEntry] {
        &self.entries
    }

    /// Number of registered assets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no assets are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The extension table used for convention-based registration.
    pub fn extension_table(&self) -> &ExtensionTable {
        &self.table
    }

    fn push(&mut self, entry: AssetEntry) -> &AssetEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }
}

/// Whether a logical name resolves to a path inside the output directory.
///
/// Rejects absolute names, drive prefixes and `..` segments.
pub fn is_contained_name(name: &str) -> bool {
    let mut has_segment = false;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) => has_segment = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    has_segment
}

fn require_path(path: &Path) -> Result<(), RegistryError> {
    if path.as_os_str().is_empty() {
        return Err(RegistryError::InvalidArgument("asset path must not be empty".to_string()));
    }
    Ok(())
}

fn logical_name(path: &Path) -> Result<String, RegistryError> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            RegistryError::InvalidArgument(format!("cannot derive a name from '{}'", path.display()))
        })
}
