//! Records persisted by the history store.

pub mod backup;
pub mod profile;
pub mod restore;

pub use backup::{BackupRecord, BackupStatus};
pub use profile::{BackupProfile, Frequency, NewProfile, UpdateProfile};
pub use restore::{RestoreRecord, RestoreStatus};

/// Timestamp format of every `date` column. Sorts lexicographically.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time in [`DATE_FORMAT`].
pub fn now_timestamp() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}

/// Join absolute source paths the way the `sources` columns store them.
pub fn join_sources<I, S>(sources: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    sources
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(";")
}

/// Inverse of [`join_sources`]; blank segments are dropped.
pub fn split_sources(sources: &str) -> Vec<String> {
    sources
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

macro_rules! status_sql {
    ($ty:ty) => {
        impl rusqlite::types::ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $ty {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}
pub(crate) use status_sql;
