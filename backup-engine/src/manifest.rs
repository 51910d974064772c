//! Directory manifests stored next to the archives they document.
//!
//! A manifest records every file of a single-directory backup with its hash
//! and size, serialized as `manifests/manifest_<timestamp>.json` beside the
//! `Backup_<timestamp>.zip` archive.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Subdirectory of the backup directory holding manifests.
pub const MANIFEST_DIR: &str = "manifests";

/// Manifest: POSIX relative path -> entry. Serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    files: BTreeMap<String, ManifestEntry>,
}

/// Metadata for a single file in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub hash: String,
    pub size: u64,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: String, entry: ManifestEntry) {
        self.files.insert(path, entry);
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.files.iter()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|e| e.size).sum()
    }

    /// Write as pretty UTF-8 JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Timestamp part of an archive name: `Backup_<ts>.zip` -> `<ts>`.
pub fn archive_timestamp(archive_name: &str) -> Option<&str> {
    archive_name
        .strip_prefix("Backup_")
        .and_then(|rest| rest.strip_suffix(".zip"))
}

/// Manifest file name for a timestamp: `manifest_<ts>.json`.
pub fn manifest_file_name(timestamp: &str) -> String {
    format!("manifest_{timestamp}.json")
}

/// Location of the manifest that belongs to `archive_name` in `backup_dir`.
pub fn manifest_path_for(backup_dir: &Path, archive_name: &str) -> Option<PathBuf> {
    archive_timestamp(archive_name)
        .map(|ts| backup_dir.join(MANIFEST_DIR).join(manifest_file_name(ts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_serializes_as_plain_object() -> Result<()> {
        let mut manifest = Manifest::new();
        manifest.insert(
            "docs/a.txt".into(),
            ManifestEntry {
                hash: "ab".into(),
                size: 3,
            },
        );
        let value: serde_json::Value = serde_json::to_value(&manifest)?;
        assert_eq!(value, serde_json::json!({"docs/a.txt": {"hash": "ab", "size": 3}}));
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(MANIFEST_DIR).join("manifest_x.json");
        let mut manifest = Manifest::new();
        manifest.insert("f".into(), ManifestEntry { hash: "00".into(), size: 9 });
        manifest.save(&path)?;
        assert_eq!(Manifest::load(&path)?, manifest);
        assert_eq!(manifest.total_bytes(), 9);
        Ok(())
    }

    #[test]
    fn test_manifest_path_for_archive() {
        let dir = Path::new("/backups");
        assert_eq!(
            manifest_path_for(dir, "Backup_2025_11_15-10_00_00.zip"),
            Some(PathBuf::from("/backups/manifests/manifest_2025_11_15-10_00_00.json"))
        );
        assert_eq!(manifest_path_for(dir, "other.zip"), None);
    }
}
