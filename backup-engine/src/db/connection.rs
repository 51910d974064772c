use crate::Result;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;

const PRAGMAS: &str = "PRAGMA journal_mode = DELETE;
     PRAGMA synchronous = FULL;
     PRAGMA busy_timeout = 5000;";

/// Open a connection pool on `db_path`, creating the parent directory.
///
/// Every pooled connection gets the same pragmas, so the pool can be shared
/// by the scheduler and foreground callers alike.
pub fn create_pool(db_path: &Path) -> Result<DbPool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let manager = SqliteConnectionManager::file(db_path).with_init(|c| c.execute_batch(PRAGMAS));
    let pool = Pool::builder().max_size(4).build(manager)?;
    Ok(pool)
}
