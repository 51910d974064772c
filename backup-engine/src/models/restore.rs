use crate::models::status_sql;
use crate::Result;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestoreStatus {
    Ok,
    OkPartial,
    Failed,
    FailedHash,
    FailedHashPartial,
    FailedPartial,
}

impl RestoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreStatus::Ok => "OK",
            RestoreStatus::OkPartial => "OK_PARTIAL",
            RestoreStatus::Failed => "FAILED",
            RestoreStatus::FailedHash => "FAILED_HASH",
            RestoreStatus::FailedHashPartial => "FAILED_HASH_PARTIAL",
            RestoreStatus::FailedPartial => "FAILED_PARTIAL",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RestoreStatus::Ok | RestoreStatus::OkPartial)
    }
}

impl fmt::Display for RestoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestoreStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "OK" => RestoreStatus::Ok,
            "OK_PARTIAL" => RestoreStatus::OkPartial,
            "FAILED" => RestoreStatus::Failed,
            "FAILED_HASH" => RestoreStatus::FailedHash,
            "FAILED_HASH_PARTIAL" => RestoreStatus::FailedHashPartial,
            "FAILED_PARTIAL" => RestoreStatus::FailedPartial,
            other => return Err(format!("unknown restore status '{other}'")),
        })
    }
}

status_sql!(RestoreStatus);

/// One restore attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRecord {
    pub backup_name: String,
    pub date: String,
    pub destination: String,
    pub status: RestoreStatus,
}

fn row_to_restore(row: &Row) -> rusqlite::Result<RestoreRecord> {
    Ok(RestoreRecord {
        backup_name: row.get("backup_name")?,
        date: row.get("date")?,
        destination: row.get("destination")?,
        status: row.get("status")?,
    })
}

pub fn insert(conn: &Connection, record: &RestoreRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO restores (backup_name, date, destination, status) VALUES (?1, ?2, ?3, ?4)",
        params![record.backup_name, record.date, record.destination, record.status],
    )?;
    Ok(())
}

/// Newest first.
pub fn history(conn: &Connection, limit: usize) -> Result<Vec<RestoreRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM restores ORDER BY id DESC LIMIT ?")?;
    let rows = stmt.query_map(params![limit as i64], row_to_restore)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
