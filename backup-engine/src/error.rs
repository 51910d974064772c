//! Error types for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("No valid backup sources")]
    NoValidSources,

    #[error("Archive I/O error: {0}")]
    ArchiveIo(String),

    #[error("Hash mismatch for {name} (expected {expected})")]
    HashMismatch { name: String, expected: String },

    #[error("No archive members match the selection: {0:?}")]
    NoMatchingMembers(Vec<String>),

    #[error("Remote mirror unavailable: {0}")]
    MirrorUnavailable(String),

    #[error("History store error: {0}")]
    HistoryStore(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl EngineError {
    /// Wrap a walker failure as an archive I/O error.
    pub fn archive(err: impl std::fmt::Display) -> Self {
        EngineError::ArchiveIo(err.to_string())
    }
}
