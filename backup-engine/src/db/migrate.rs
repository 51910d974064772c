use crate::db::connection::DbPool;
use crate::Result;
use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS backups (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  date TEXT NOT NULL,
  path TEXT NOT NULL,
  size INTEGER NOT NULL DEFAULT 0,
  hash TEXT,
  status TEXT NOT NULL CHECK(status IN ('OK','FAILED'))
);

CREATE TABLE IF NOT EXISTS backup_profiles (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  sources TEXT NOT NULL DEFAULT '',
  backup_directory TEXT NOT NULL,
  restore_directory TEXT NOT NULL,
  backup_frequency TEXT NOT NULL DEFAULT 'daily',
  daily_report_enable INTEGER NOT NULL DEFAULT 0,
  daily_report_time TEXT NOT NULL DEFAULT '8:00',
  recipient_email TEXT,
  is_default INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS restores (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  backup_name TEXT NOT NULL,
  date TEXT NOT NULL,
  destination TEXT NOT NULL,
  status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_backups_name ON backups(name);
CREATE INDEX IF NOT EXISTS idx_backups_date ON backups(date DESC);
"#;

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns.iter().any(|c| c == column))
}

/// Create missing tables and bring older databases up to date.
pub fn migrate(pool: &DbPool) -> Result<()> {
    tracing::info!("[DB] Starting database migration...");

    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;

    // Databases created before source lists were recorded.
    if !has_column(&conn, "backups", "sources")? {
        conn.execute_batch("ALTER TABLE backups ADD COLUMN sources TEXT NOT NULL DEFAULT ''")?;
    }

    tracing::info!("[DB] Migration completed successfully");
    Ok(())
}
