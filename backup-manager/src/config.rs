//! Application configuration.
//!
//! Loads a TOML file (all sections optional), then applies `.env` and
//! environment variable overrides.

use backup_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
    pub checksum: ChecksumConfig,
    pub notify: NotifyConfig,
    pub mirror: MirrorConfig,
    pub retention: RetentionConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    #[serde(default = "default_restore_dir")]
    pub restore_dir: PathBuf,

    /// Backed up when a backup is requested without sources.
    #[serde(default)]
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files; no file logging when unset.
    #[serde(default = "default_log_dir")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecksumConfig {
    /// sha256, sha224, sha384, sha512 or sha1
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub recipient: Option<String>,

    /// Spool messages here for a mail relay; log them when unset.
    #[serde(default)]
    pub outbox_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Synced folder used as the remote copy of every archive.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub max_backups: Option<usize>,
}

/// Used by the scheduler when no backup profile exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_frequency")]
    pub frequency: String,

    #[serde(default)]
    pub daily_report_enable: bool,

    #[serde(default = "default_report_time")]
    pub daily_report_time: String,
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_restore_dir() -> PathBuf {
    PathBuf::from("restored_files")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/backup_history.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

fn default_algorithm() -> String {
    "sha256".to_string()
}

fn default_frequency() -> String {
    "daily".to_string()
}

fn default_report_time() -> String {
    "8:00".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            restore_dir: default_restore_dir(),
            sources: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
        }
    }
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            daily_report_enable: false,
            daily_report_time: default_report_time(),
        }
    }
}

impl AppConfig {
    /// Load a TOML configuration file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// File (or defaults), then `.env`, then the process environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `BACKUP_DIR`, `RESTORE_DIR`, `BACKUP_DB_PATH`, `BACKUP_LOG_DIR`,
    /// `BACKUP_RECIPIENT` and `LOG_LEVEL` from `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("BACKUP_DIR") {
            self.paths.backup_dir = PathBuf::from(v);
        }
        if let Some(v) = var("RESTORE_DIR") {
            self.paths.restore_dir = PathBuf::from(v);
        }
        if let Some(v) = var("BACKUP_DB_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = var("BACKUP_LOG_DIR") {
            self.log.dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("BACKUP_RECIPIENT") {
            self.notify.recipient = Some(v);
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log.level = v;
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(&self.paths.backup_dir, &self.paths.restore_dir)
            .with_recipient(self.notify.recipient.clone())
            .with_max_backups(self.retention.max_backups);
        config.algorithm = self.checksum.algorithm.clone();
        config
    }
}
