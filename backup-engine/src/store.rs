//! History store contract and its SQLite implementation.

use crate::db::{self, DbPool};
use crate::models::{
    backup, profile, restore, BackupProfile, BackupRecord, NewProfile, RestoreRecord,
    UpdateProfile,
};
use crate::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{error, warn};

/// File in the backup directory that receives records the store rejected.
pub const FALLBACK_FILE: &str = "history-fallback.jsonl";

/// Persistence used by the engines. Every method is part of the contract;
/// a store either implements all of them or is not a history store.
pub trait HistoryStore: Send + Sync {
    fn record_backup(&self, record: &BackupRecord) -> Result<()>;
    /// Most recently recorded backup with this name.
    fn find_backup(&self, name: &str) -> Result<Option<BackupRecord>>;
    /// Newest first.
    fn backup_history(&self, limit: usize) -> Result<Vec<BackupRecord>>;
    /// Backups dated at or after `since` (`models::DATE_FORMAT`).
    fn backups_since(&self, since: &str) -> Result<Vec<BackupRecord>>;

    fn record_restore(&self, record: &RestoreRecord) -> Result<()>;
    fn restore_history(&self, limit: usize) -> Result<Vec<RestoreRecord>>;

    fn get_profile(&self, id: i64) -> Result<Option<BackupProfile>>;
    fn default_profile(&self) -> Result<Option<BackupProfile>>;
    fn list_profiles(&self, limit: usize) -> Result<Vec<BackupProfile>>;
    fn create_profile(&self, data: &NewProfile) -> Result<BackupProfile>;
    fn update_profile(&self, id: i64, data: &UpdateProfile) -> Result<Option<BackupProfile>>;
    /// Clears every other default atomically. False if `id` is unknown.
    fn set_default_profile(&self, id: i64) -> Result<bool>;
    fn delete_profile(&self, id: i64) -> Result<bool>;
}

#[derive(Serialize)]
struct FallbackLine<'a, T> {
    kind: &'a str,
    error: String,
    record: &'a T,
}

/// Append a record the store refused to `<dir>/history-fallback.jsonl`.
///
/// Failures here are only logged; there is nowhere further to fall back to.
pub fn append_fallback<T: Serialize>(dir: &Path, kind: &str, record: &T, cause: &crate::EngineError) {
    let path = dir.join(FALLBACK_FILE);
    let line = FallbackLine {
        kind,
        error: cause.to_string(),
        record,
    };
    let result = serde_json::to_string(&line)
        .map_err(std::io::Error::other)
        .and_then(|json| {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            writeln!(file, "{json}")
        });
    match result {
        Ok(()) => warn!(kind, path = %path.display(), "History record written to fallback file"),
        Err(e) => error!(kind, error = %e, "History record lost: fallback file not writable"),
    }
}

/// [`HistoryStore`] backed by a pooled SQLite database.
#[derive(Clone)]
pub struct SqliteHistory {
    pool: DbPool,
}

impl SqliteHistory {
    /// Open (or create) the database at `path` and migrate it.
    pub fn open(path: &Path) -> Result<Self> {
        let pool = db::create_pool(path)?;
        db::migrate(&pool)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl HistoryStore for SqliteHistory {
    fn record_backup(&self, record: &BackupRecord) -> Result<()> {
        let conn = self.pool.get()?;
        backup::insert(&conn, record)
    }

    fn find_backup(&self, name: &str) -> Result<Option<BackupRecord>> {
        let conn = self.pool.get()?;
        backup::find_by_name(&conn, name)
    }

    fn backup_history(&self, limit: usize) -> Result<Vec<BackupRecord>> {
        let conn = self.pool.get()?;
        backup::history(&conn, limit)
    }

    fn backups_since(&self, since: &str) -> Result<Vec<BackupRecord>> {
        let conn = self.pool.get()?;
        backup::since(&conn, since)
    }

    fn record_restore(&self, record: &RestoreRecord) -> Result<()> {
        let conn = self.pool.get()?;
        restore::insert(&conn, record)
    }

    fn restore_history(&self, limit: usize) -> Result<Vec<RestoreRecord>> {
        let conn = self.pool.get()?;
        restore::history(&conn, limit)
    }

    fn get_profile(&self, id: i64) -> Result<Option<BackupProfile>> {
        let conn = self.pool.get()?;
        profile::find_by_id(&conn, id)
    }

    fn default_profile(&self) -> Result<Option<BackupProfile>> {
        let conn = self.pool.get()?;
        profile::find_default(&conn)
    }

    fn list_profiles(&self, limit: usize) -> Result<Vec<BackupProfile>> {
        let conn = self.pool.get()?;
        profile::find_all(&conn, limit)
    }

    fn create_profile(&self, data: &NewProfile) -> Result<BackupProfile> {
        let conn = self.pool.get()?;
        profile::create(&conn, data)
    }

    fn update_profile(&self, id: i64, data: &UpdateProfile) -> Result<Option<BackupProfile>> {
        let conn = self.pool.get()?;
        profile::update(&conn, id, data)
    }

    fn set_default_profile(&self, id: i64) -> Result<bool> {
        let conn = self.pool.get()?;
        profile::set_default(&conn, id)
    }

    fn delete_profile(&self, id: i64) -> Result<bool> {
        let conn = self.pool.get()?;
        profile::delete(&conn, id)
    }
}
