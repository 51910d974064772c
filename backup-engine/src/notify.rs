//! Notification contract, message builders and shipped notifiers.
//!
//! Delivery is best-effort: engines log a failed `send` and carry on.

use crate::error::EngineError;
use crate::models::{now_timestamp, BackupRecord, BackupStatus, RestoreStatus};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SUBJECT_PREFIX: &str = "[Backup System]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub recipient: Option<String>,
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            recipient: None,
            attachments: Vec::new(),
        }
    }

    pub fn to(mut self, recipient: Option<String>) -> Self {
        self.recipient = recipient;
        self
    }

    /// Attach files that exist; missing ones are left out.
    pub fn attach<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.attachments.extend(paths.into_iter().filter(|p| p.is_file()));
        self
    }
}

pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<()>;
}

/// Result of a backup attempt.
///
/// `details` carries the error text for failures; successful backups list
/// size, hash, path, sources and the mirror link when there is one.
pub fn backup_message(
    name: &str,
    status: BackupStatus,
    record: Option<&BackupRecord>,
    mirror_link: Option<&str>,
    error: Option<&str>,
) -> Notification {
    let mut details = String::new();
    if let Some(record) = record.filter(|r| r.is_ok()) {
        let _ = writeln!(details, "Size: {}B", record.size);
        let _ = writeln!(details, "Hash: {}", record.hash.as_deref().unwrap_or("-"));
        let _ = writeln!(details, "Backup path: {}", record.path);
        details.push_str("Sources:\n");
        for source in crate::models::split_sources(&record.sources) {
            let _ = writeln!(details, "- {source}");
        }
        if let Some(link) = mirror_link {
            let _ = writeln!(details, "Remote copy: {link}");
        }
    }
    if let Some(error) = error {
        let _ = writeln!(details, "Error while creating backup: {error}");
    }

    let body = format!(
        "Date: {}\nBackup name: {}\nStatus: {}\nDetails:\n{}",
        now_timestamp(),
        name,
        status,
        details
    );
    Notification::new(format!("{SUBJECT_PREFIX} Status: {status} ({name})"), body)
}

/// Result of a restore attempt.
pub fn restore_message(
    name: &str,
    status: RestoreStatus,
    destination: &Path,
    details: &str,
) -> Notification {
    let body = format!(
        "Date: {}\nBackup name: {}\nRestore status: {}\nDestination: {}\nDetails:\n{}\n",
        now_timestamp(),
        name,
        status,
        destination.display(),
        details
    );
    Notification::new(format!("{SUBJECT_PREFIX} Restore: {status} ({name})"), body)
}

/// Summary of the backups recorded in the last 24 hours.
pub fn daily_report_message(records: &[BackupRecord]) -> Notification {
    let body = if records.is_empty() {
        "No backups were made in the last 24 hours\n".to_string()
    } else {
        let mut body = String::from("Backups made in the last 24 hours:\n");
        for record in records {
            let _ = writeln!(body, "- {} | {} | {}", record.name, record.date, record.status);
        }
        body
    };
    Notification::new(format!("{SUBJECT_PREFIX} Daily report"), body)
}

/// Writes every message to the log. Used when no relay is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            subject = %notification.subject,
            recipient = notification.recipient.as_deref().unwrap_or("-"),
            attachments = notification.attachments.len(),
            "Notification:\n{}",
            notification.body
        );
        Ok(())
    }
}

/// Spools messages into a directory for an external mail relay.
///
/// Each message gets its own `<timestamp>-<uuid>/` folder holding
/// `message.json` and copies of the attachments.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    outbox: PathBuf,
}

impl OutboxNotifier {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self { outbox: outbox.into() }
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, notification: &Notification) -> Result<()> {
        let folder = self.outbox.join(format!(
            "{}-{}",
            chrono::Local::now().format("%Y%m%d%H%M%S"),
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&folder)
            .map_err(|e| EngineError::Notification(format!("{}: {}", folder.display(), e)))?;

        let mut spooled = notification.clone();
        spooled.attachments.clear();
        for attachment in &notification.attachments {
            let Some(file_name) = attachment.file_name() else {
                continue;
            };
            let target = folder.join(file_name);
            match std::fs::copy(attachment, &target) {
                Ok(_) => spooled.attachments.push(target),
                Err(e) => warn!(path = %attachment.display(), error = %e, "Attachment not spooled"),
            }
        }

        let json = serde_json::to_string_pretty(&spooled)?;
        std::fs::write(folder.join("message.json"), json)
            .map_err(|e| EngineError::Notification(e.to_string()))?;
        info!(subject = %notification.subject, outbox = %folder.display(), "Notification spooled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ok_record() -> BackupRecord {
        BackupRecord {
            name: "Backup_2025_01_01-08_00_00.zip".into(),
            date: "2025-01-01 08:00:00".into(),
            path: "/backups/Backup_2025_01_01-08_00_00.zip".into(),
            size: 1234,
            hash: Some("ff".repeat(32)),
            status: BackupStatus::Ok,
            sources: "/data/notes.txt;/data/photos".into(),
        }
    }

    #[test]
    fn test_backup_message() {
        let record = ok_record();
        let msg = backup_message(&record.name, record.status, Some(&record), Some("mirror://x"), None);
        assert_eq!(msg.subject, "[Backup System] Status: OK (Backup_2025_01_01-08_00_00.zip)");
        assert!(msg.body.contains("Size: 1234B"));
        assert!(msg.body.contains("- /data/photos"));
        assert!(msg.body.contains("Remote copy: mirror://x"));
    }

    #[test]
    fn test_failure_message_carries_error() {
        let msg = backup_message("Backup_x.zip", BackupStatus::Failed, None, None, Some("disk full"));
        assert_eq!(msg.subject, "[Backup System] Status: FAILED (Backup_x.zip)");
        assert!(msg.body.contains("disk full"));
    }

    #[test]
    fn test_daily_report_lines() {
        assert!(daily_report_message(&[]).body.starts_with("No backups"));
        let msg = daily_report_message(&[ok_record()]);
        assert!(msg
            .body
            .contains("- Backup_2025_01_01-08_00_00.zip | 2025-01-01 08:00:00 | OK"));
    }

    #[test]
    fn test_outbox_spools_message_and_attachments() -> Result<()> {
        let temp = TempDir::new()?;
        let log = temp.path().join("backup_log_2025-01-01.log");
        std::fs::write(&log, "log line")?;
        let outbox = OutboxNotifier::new(temp.path().join("outbox"));

        let msg = restore_message("Backup_x.zip", RestoreStatus::Ok, Path::new("/restore"), "")
            .to(Some("me@example.com".into()))
            .attach([log, temp.path().join("missing.json")]);
        assert_eq!(msg.attachments.len(), 1);
        outbox.send(&msg)?;

        let folders: Vec<_> = std::fs::read_dir(outbox.outbox())?.collect::<std::io::Result<_>>()?;
        assert_eq!(folders.len(), 1);
        let folder = folders[0].path();
        let spooled: Notification =
            serde_json::from_str(&std::fs::read_to_string(folder.join("message.json"))?)?;
        assert_eq!(spooled.subject, "[Backup System] Restore: OK (Backup_x.zip)");
        assert_eq!(spooled.recipient.as_deref(), Some("me@example.com"));
        assert_eq!(std::fs::read_to_string(folder.join("backup_log_2025-01-01.log"))?, "log line");
        Ok(())
    }
}
