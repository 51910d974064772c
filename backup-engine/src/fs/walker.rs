//! Directory traversal for archiving and manifest building.
//!
//! Yields every regular file beneath a root together with its path relative
//! to that root in POSIX form, which is the form used for archive member
//! names and manifest keys.

use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links to directories
    pub follow_links: bool,

    /// Absolute paths that must never be yielded (e.g. the archive being written)
    pub exclude_paths: Vec<PathBuf>,
}

impl WalkOptions {
    pub fn excluding(path: impl Into<PathBuf>) -> Self {
        Self {
            follow_links: false,
            exclude_paths: vec![path.into()],
        }
    }
}

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Is this a symlink to a regular file?
    pub is_symlink: bool,
}

impl FileInfo {
    /// For symlinks, resolves to the target to get the real file size.
    /// Returns None if the symlink target is a directory or cannot be resolved.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let raw_metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let is_symlink = raw_metadata.is_symlink();

        let size = if is_symlink {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => resolved.len(),
                // Symlink to a directory, or broken
                _ => return Ok(None),
            }
        } else if raw_metadata.is_file() {
            raw_metadata.len()
        } else {
            return Ok(None);
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
            is_symlink,
        }))
    }

    /// Relative path with `/` separators.
    pub fn relative_posix(&self) -> String {
        to_posix(&self.relative_path)
    }
}

/// Join the normal components of `path` with `/`.
pub fn to_posix(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Absolute form of `path` with `.` dropped and `..` applied lexically.
/// Symlinks are not resolved and the path need not exist.
pub fn absolute_lexical(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Walk a directory tree with a callback for each regular file.
///
/// Entries are visited in file-name order within each directory so archives
/// and manifests built from the same tree list members in the same order.
pub fn walk_files<F>(root: &Path, options: &WalkOptions, mut callback: F) -> std::io::Result<()>
where
    F: FnMut(FileInfo) -> std::io::Result<()>,
{
    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;

        if entry.file_type().is_dir() {
            continue;
        }

        if options.exclude_paths.iter().any(|p| p == entry.path()) {
            tracing::debug!(path = %entry.path().display(), "Skipping excluded path");
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            callback(file_info)?;
        }
    }

    Ok(())
}

/// Walk a directory tree and collect all regular files
pub fn walk_directory(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();
    walk_files(root, options, |file| {
        files.push(file);
        Ok(())
    })?;
    Ok(files)
}
