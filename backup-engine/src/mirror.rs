//! Remote mirror contract and a directory-backed implementation.

use crate::error::EngineError;
use crate::fs::walker::{walk_directory, WalkOptions};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A file held by the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub modified_time: DateTime<Utc>,
    pub size: u64,
}

pub trait RemoteMirror: Send + Sync {
    /// Copy a local file to the mirror; returns a link or id for it.
    fn upload(&self, local_path: &Path) -> Result<String>;
    /// Files named exactly `name`, newest first.
    fn find_by_name(&self, name: &str) -> Result<Vec<RemoteFile>>;
    /// Fetch a file by id into `local_path` and return that path.
    fn download(&self, id: &str, local_path: &Path) -> Result<PathBuf>;
}

/// A mounted or synced folder (for example a cloud drive client folder)
/// used as the object store. Ids are `/`-separated paths relative to the
/// folder; uploads land at its top level.
#[derive(Debug, Clone)]
pub struct DirectoryMirror {
    root: PathBuf,
}

impl DirectoryMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(EngineError::MirrorUnavailable(format!(
                "{} is not a directory",
                self.root.display()
            )))
        }
    }
}

impl RemoteMirror for DirectoryMirror {
    fn upload(&self, local_path: &Path) -> Result<String> {
        self.ensure_root()?;
        let name = local_path
            .file_name()
            .ok_or_else(|| EngineError::NotFound(local_path.to_path_buf()))?;
        let target = self.root.join(name);
        std::fs::copy(local_path, &target)
            .map_err(|e| EngineError::MirrorUnavailable(format!("upload failed: {e}")))?;
        info!(file = %local_path.display(), remote = %target.display(), "Uploaded to mirror");
        Ok(format!("file://{}", target.display()))
    }

    fn find_by_name(&self, name: &str) -> Result<Vec<RemoteFile>> {
        self.ensure_root()?;
        let files = walk_directory(&self.root, &WalkOptions::default())
            .map_err(|e| EngineError::MirrorUnavailable(e.to_string()))?;

        let mut matches = Vec::new();
        for file in files {
            if file.path.file_name().and_then(|n| n.to_str()) != Some(name) {
                continue;
            }
            let modified = std::fs::metadata(&file.path)?.modified()?;
            matches.push(RemoteFile {
                id: file.relative_posix(),
                name: name.to_string(),
                modified_time: DateTime::<Utc>::from(modified),
                size: file.size,
            });
        }
        matches.sort_by(|a, b| b.modified_time.cmp(&a.modified_time));
        debug!(name, found = matches.len(), "Mirror lookup");
        Ok(matches)
    }

    fn download(&self, id: &str, local_path: &Path) -> Result<PathBuf> {
        self.ensure_root()?;
        if id.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(EngineError::MirrorUnavailable(format!("invalid id '{id}'")));
        }
        let source = self.root.join(id);
        if !source.is_file() {
            return Err(EngineError::NotFound(source));
        }
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&source, local_path)
            .map_err(|e| EngineError::MirrorUnavailable(format!("download failed: {e}")))?;
        info!(remote = id, file = %local_path.display(), "Downloaded from mirror");
        Ok(local_path.to_path_buf())
    }
}
