use crate::models::status_sql;
use crate::Result;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BackupStatus {
    Ok,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Ok => "OK",
            BackupStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "OK" => Ok(BackupStatus::Ok),
            "FAILED" => Ok(BackupStatus::Failed),
            other => Err(format!("unknown backup status '{other}'")),
        }
    }
}

status_sql!(BackupStatus);

/// Outcome of one backup attempt. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub name: String,
    pub date: String,
    pub path: String,
    pub size: u64,
    pub hash: Option<String>,
    pub status: BackupStatus,
    /// Semicolon-joined absolute source paths.
    pub sources: String,
}

impl BackupRecord {
    pub fn is_ok(&self) -> bool {
        self.status == BackupStatus::Ok
    }
}

fn row_to_backup(row: &Row) -> rusqlite::Result<BackupRecord> {
    Ok(BackupRecord {
        name: row.get("name")?,
        date: row.get("date")?,
        path: row.get("path")?,
        size: row.get::<_, i64>("size")?.max(0) as u64,
        hash: row.get("hash")?,
        status: row.get("status")?,
        sources: row.get("sources")?,
    })
}

pub fn insert(conn: &Connection, record: &BackupRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO backups (name, date, path, size, hash, status, sources)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.name,
            record.date,
            record.path,
            record.size as i64,
            record.hash,
            record.status,
            record.sources,
        ],
    )?;
    Ok(())
}

/// Newest first.
pub fn history(conn: &Connection, limit: usize) -> Result<Vec<BackupRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM backups ORDER BY id DESC LIMIT ?")?;
    let rows = stmt.query_map(params![limit as i64], row_to_backup)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// The most recently recorded backup with this name.
pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<BackupRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM backups WHERE name = ? ORDER BY id DESC LIMIT 1")?;
    let mut rows = stmt.query_map(params![name], row_to_backup)?;
    Ok(rows.next().transpose()?)
}

/// Backups dated at or after `since` (a `DATE_FORMAT` timestamp), newest first.
pub fn since(conn: &Connection, since: &str) -> Result<Vec<BackupRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM backups WHERE date >= ? ORDER BY id DESC")?;
    let rows = stmt.query_map(params![since], row_to_backup)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
