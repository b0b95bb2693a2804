//! Default importer/processor lookup keyed on file extension.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Importer/processor pair applied to an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    /// Importer that parses the raw file format
    pub importer: String,
    /// Processor that converts the imported data (`None` = pass-through)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
}

impl Transform {
    /// Create a transform with both stages named.
    pub fn new(importer: &str, processor: &str) -> Self {
        Self { importer: importer.to_string(), processor: Some(processor.to_string()) }
    }

    /// Create a transform that imports without further processing.
    pub fn import_only(importer: &str) -> Self {
        Self { importer: importer.to_string(), processor: None }
    }
}

/// Extension to default transform table.
#[derive(Debug, Clone)]
pub struct ExtensionTable {
    entries: HashMap<String, Transform>,
}

impl ExtensionTable {
    /// Create an empty table.
    pub fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Register or replace the transform for an extension.
    ///
    /// The extension is stored lowercased, with any leading dot removed.
    pub fn insert(&mut self, extension: &str, transform: Transform) {
        self.entries.insert(normalize_extension(extension), transform);
    }

    /// Look up the transform for an extension (case-insensitive).
    pub fn get(&self, extension: &str) -> Option<&Transform> {
        self.entries.get(&normalize_extension(extension))
    }

    /// Look up the transform for a path's extension.
    pub fn lookup(&self, path: &Path) -> Option<&Transform> {
        path.extension().and_then(|e| e.to_str()).and_then(|e| self.get(e))
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ExtensionTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for ext in ["png", "jpg", "jpeg", "bmp", "tga", "dds", "gif"] {
            table.insert(ext, Transform::new("TextureImporter", "TextureProcessor"));
        }
        table.insert("fbx", Transform::new("FbxImporter", "ModelProcessor"));
        table.insert("x", Transform::new("XImporter", "ModelProcessor"));
        table.insert("fx", Transform::new("EffectImporter", "EffectProcessor"));
        table.insert(
            "spritefont",
            Transform::new("FontDescriptionImporter", "FontDescriptionProcessor"),
        );
        table.insert("wav", Transform::new("WavImporter", "SoundEffectProcessor"));
        table.insert("mp3", Transform::new("Mp3Importer", "SongProcessor"));
        table.insert("ogg", Transform::new("OggImporter", "SongProcessor"));
        table.insert("wma", Transform::new("WmaImporter", "SongProcessor"));
        table.insert("xml", Transform::import_only("XmlImporter"));
        table
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lookup_is_case_insensitive() {
        let table = ExtensionTable::default();
        let png = table.lookup(Path::new("sprites/Hero.PNG")).unwrap();
        assert_eq!(png.importer, "TextureImporter");
        assert_eq!(png.processor.as_deref(), Some("TextureProcessor"));
        assert_eq!(table.get(".Fbx").unwrap().processor.as_deref(), Some("ModelProcessor"));
    }

    #[test]
    fn test_xml_has_no_processor() {
        let table = ExtensionTable::default();
        assert_eq!(table.get("xml").unwrap().processor, None);
    }

    #[test]
    fn test_unknown_and_missing_extensions() {
        let table = ExtensionTable::default();
        assert!(table.lookup(Path::new("notes.txt")).is_none());
        assert!(table.lookup(Path::new("Makefile")).is_none());
    }

    #[test]
    fn test_insert_overrides_default() {
        let mut table = ExtensionTable::default();
        let before = table.len();
        table.insert(".PNG", Transform::new("PngImporter", "SpriteProcessor"));

        assert_eq!(table.len(), before);
        assert_eq!(table.get("png").unwrap().importer, "PngImporter");
    }
}
