//! Logging configuration using tracing.
//!
//! Logs go to stdout and, when a log directory is configured, to
//! `<dir>/backup_log_<YYYY-MM-DD>.log` named after the start-up date.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// What logging was set up with. Engines get the log file from here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogHandle {
    pub file: Option<PathBuf>,
}

pub fn log_file_path(dir: &Path, date: chrono::NaiveDate) -> PathBuf {
    dir.join(format!("backup_log_{}.log", date.format("%Y-%m-%d")))
}

/// Initialize logging with the specified level
pub fn init(level: &str, log_dir: Option<&Path>) -> anyhow::Result<LogHandle> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut handle = LogHandle::default();
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = log_file_path(dir, chrono::Local::now().date_naive());
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            handle.file = Some(path);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 11, 15).unwrap();
        assert_eq!(
            log_file_path(Path::new("/var/log/backup"), date),
            PathBuf::from("/var/log/backup/backup_log_2025-11-15.log")
        );
    }
}
