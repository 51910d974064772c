use crate::models::{join_sources, split_sources};
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How often scheduled backups of a profile run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// `None` for anything that is not a known policy name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupProfile {
    pub id: i64,
    pub name: String,
    /// Semicolon-joined source paths.
    pub sources: String,
    pub backup_directory: String,
    pub restore_directory: String,
    /// Stored verbatim; see [`Frequency::parse`].
    pub backup_frequency: String,
    pub daily_report_enable: bool,
    pub daily_report_time: String,
    pub recipient_email: Option<String>,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl BackupProfile {
    pub fn source_list(&self) -> Vec<String> {
        split_sources(&self.sources)
    }

    pub fn frequency(&self) -> Option<Frequency> {
        Frequency::parse(&self.backup_frequency)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProfile {
    pub name: String,
    pub sources: Vec<String>,
    pub backup_directory: String,
    pub restore_directory: String,
    #[serde(default = "default_frequency")]
    pub backup_frequency: String,
    #[serde(default)]
    pub daily_report_enable: bool,
    #[serde(default = "default_report_time")]
    pub daily_report_time: String,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

fn default_frequency() -> String {
    Frequency::Daily.as_str().to_string()
}

fn default_report_time() -> String {
    "8:00".to_string()
}

impl NewProfile {
    pub fn new(
        name: impl Into<String>,
        sources: Vec<String>,
        backup_directory: impl Into<String>,
        restore_directory: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            sources,
            backup_directory: backup_directory.into(),
            restore_directory: restore_directory.into(),
            backup_frequency: default_frequency(),
            daily_report_enable: false,
            daily_report_time: default_report_time(),
            recipient_email: None,
            is_default: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub sources: Option<Vec<String>>,
    pub backup_directory: Option<String>,
    pub restore_directory: Option<String>,
    pub backup_frequency: Option<String>,
    pub daily_report_enable: Option<bool>,
    pub daily_report_time: Option<String>,
    pub recipient_email: Option<Option<String>>,
}

fn row_to_profile(row: &Row) -> rusqlite::Result<BackupProfile> {
    Ok(BackupProfile {
        id: row.get("id")?,
        name: row.get("name")?,
        sources: row.get("sources")?,
        backup_directory: row.get("backup_directory")?,
        restore_directory: row.get("restore_directory")?,
        backup_frequency: row.get("backup_frequency")?,
        daily_report_enable: row.get("daily_report_enable")?,
        daily_report_time: row.get("daily_report_time")?,
        recipient_email: row.get("recipient_email")?,
        is_default: row.get("is_default")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<BackupProfile>> {
    Ok(conn
        .query_row("SELECT * FROM backup_profiles WHERE id = ?", params![id], row_to_profile)
        .optional()?)
}

pub fn find_default(conn: &Connection) -> Result<Option<BackupProfile>> {
    Ok(conn
        .query_row(
            "SELECT * FROM backup_profiles WHERE is_default = 1 ORDER BY id DESC LIMIT 1",
            [],
            row_to_profile,
        )
        .optional()?)
}

pub fn find_all(conn: &Connection, limit: usize) -> Result<Vec<BackupProfile>> {
    let mut stmt = conn.prepare("SELECT * FROM backup_profiles ORDER BY id DESC LIMIT ?")?;
    let rows = stmt.query_map(params![limit as i64], row_to_profile)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Insert a profile. When it is flagged default, every other default is
/// cleared in the same transaction.
pub fn create(conn: &Connection, data: &NewProfile) -> Result<BackupProfile> {
    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    if data.is_default {
        tx.execute("UPDATE backup_profiles SET is_default = 0 WHERE is_default = 1", [])?;
    }
    tx.execute(
        "INSERT INTO backup_profiles (name, sources, backup_directory, restore_directory, backup_frequency, daily_report_enable, daily_report_time, recipient_email, is_default, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            data.name,
            join_sources(&data.sources),
            data.backup_directory,
            data.restore_directory,
            data.backup_frequency,
            data.daily_report_enable,
            data.daily_report_time,
            data.recipient_email,
            data.is_default,
            now,
            now,
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    find_by_id(conn, id)?.ok_or_else(|| {
        crate::EngineError::HistoryStore(format!("profile {id} vanished after insert"))
    })
}

pub fn update(conn: &Connection, id: i64, data: &UpdateProfile) -> Result<Option<BackupProfile>> {
    if find_by_id(conn, id)?.is_none() {
        return Ok(None);
    }

    let mut sets = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref name) = data.name {
        sets.push("name = ?");
        values.push(Box::new(name.clone()));
    }
    if let Some(ref sources) = data.sources {
        sets.push("sources = ?");
        values.push(Box::new(join_sources(sources)));
    }
    if let Some(ref dir) = data.backup_directory {
        sets.push("backup_directory = ?");
        values.push(Box::new(dir.clone()));
    }
    if let Some(ref dir) = data.restore_directory {
        sets.push("restore_directory = ?");
        values.push(Box::new(dir.clone()));
    }
    if let Some(ref frequency) = data.backup_frequency {
        sets.push("backup_frequency = ?");
        values.push(Box::new(frequency.clone()));
    }
    if let Some(enable) = data.daily_report_enable {
        sets.push("daily_report_enable = ?");
        values.push(Box::new(enable));
    }
    if let Some(ref time) = data.daily_report_time {
        sets.push("daily_report_time = ?");
        values.push(Box::new(time.clone()));
    }
    if let Some(ref recipient) = data.recipient_email {
        sets.push("recipient_email = ?");
        values.push(Box::new(recipient.clone()));
    }

    if sets.is_empty() {
        return find_by_id(conn, id);
    }

    sets.push("updated_at = ?");
    values.push(Box::new(chrono::Utc::now().to_rfc3339()));
    values.push(Box::new(id));

    let sql = format!("UPDATE backup_profiles SET {} WHERE id = ?", sets.join(", "));
    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&sql, params.as_slice())?;
    find_by_id(conn, id)
}

/// Make `id` the only default profile. Returns false when it does not exist.
pub fn set_default(conn: &Connection, id: i64) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM backup_profiles WHERE id = ?)",
        params![id],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(false);
    }
    tx.execute("UPDATE backup_profiles SET is_default = 0 WHERE id != ?", params![id])?;
    tx.execute(
        "UPDATE backup_profiles SET is_default = 1, updated_at = ? WHERE id = ?",
        params![chrono::Utc::now().to_rfc3339(), id],
    )?;
    tx.commit()?;
    Ok(true)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let changes = conn.execute("DELETE FROM backup_profiles WHERE id = ?", params![id])?;
    Ok(changes > 0)
}
