//! Backup Engine Library
//!
//! ZIP-based backup and restore with SHA-family integrity checks, directory
//! manifests and an SQLite operation history.

pub mod archive;
pub mod backup;
pub mod checksum;
pub mod config;
pub mod db;
pub mod error;
pub mod fs;
pub mod locks;
pub mod manifest;
pub mod mirror;
pub mod models;
pub mod notify;
pub mod report;
pub mod restore;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use backup::BackupEngine;
pub use config::EngineConfig;
pub use error::EngineError;
pub use restore::{RestoreEngine, RestorePlan};
pub use store::{HistoryStore, SqliteHistory};
pub type Result<T> = std::result::Result<T, EngineError>;
