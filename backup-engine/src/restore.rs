//! Restore orchestration.
//!
//! Every restore that reaches the archive is recorded and notified. When a
//! hash is known the archive is verified before a single byte is extracted.

use crate::archive::{extract_all, extract_matching, list_members, root_groups, ExtractSummary, Selection};
use crate::checksum::verify_digest;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::mirror::RemoteMirror;
use crate::models::{now_timestamp, RestoreRecord, RestoreStatus};
use crate::notify::{restore_message, Notifier};
use crate::store::{append_fallback, HistoryStore};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Full restore or a selection of member-path prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "selection")]
pub enum RestorePlan {
    Full,
    Partial(Vec<String>),
}

pub struct RestoreEngine {
    store: Arc<dyn HistoryStore>,
    notifier: Arc<dyn Notifier>,
    mirror: Option<Arc<dyn RemoteMirror>>,
    log_file: Option<PathBuf>,
}

impl RestoreEngine {
    pub fn new(store: Arc<dyn HistoryStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            mirror: None,
            log_file: None,
        }
    }

    pub fn with_mirror(mut self, mirror: Option<Arc<dyn RemoteMirror>>) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    /// Archive file names in the backup directory, sorted.
    pub fn list_backups(&self, config: &EngineConfig) -> Vec<String> {
        let entries = match std::fs::read_dir(&config.backup_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %config.backup_dir.display(), error = %e, "Backup directory not readable");
                return Vec::new();
            }
        };
        let mut backups: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.ends_with(".zip"))
            .collect();
        backups.sort();
        debug!(dir = %config.backup_dir.display(), count = backups.len(), "Backups listed");
        backups
    }

    /// Member paths of an archive; empty when it cannot be read.
    pub fn preview_contents(&self, config: &EngineConfig, backup_name: &str) -> Vec<String> {
        let result = archive_path(config, backup_name).and_then(|path| list_members(&path));
        match result {
            Ok(members) => members,
            Err(e) => {
                error!(backup = backup_name, error = %e, "Cannot read archive contents");
                Vec::new()
            }
        }
    }

    /// Distinct first path segments of the archive members, the unit a
    /// caller picks from for a partial restore.
    pub fn root_groups(&self, config: &EngineConfig, backup_name: &str) -> Vec<String> {
        root_groups(self.preview_contents(config, backup_name))
    }

    pub fn restore_backup(
        &self,
        config: &EngineConfig,
        backup_name: &str,
        destination: Option<&Path>,
        expected_hash: Option<&str>,
    ) -> bool {
        succeeded(self.run(config, backup_name, destination, expected_hash, None))
    }

    /// Extract only members equal to or beneath one of `selection`.
    ///
    /// A selection that matches nothing extracts nothing and returns false.
    pub fn restore_selected(
        &self,
        config: &EngineConfig,
        backup_name: &str,
        selection: &[String],
        destination: Option<&Path>,
        expected_hash: Option<&str>,
    ) -> bool {
        let selection = Selection::new(selection);
        succeeded(self.run(config, backup_name, destination, expected_hash, Some(&selection)))
    }

    pub fn restore_with_plan(
        &self,
        config: &EngineConfig,
        backup_name: &str,
        plan: &RestorePlan,
        destination: Option<&Path>,
        expected_hash: Option<&str>,
    ) -> bool {
        succeeded(self.restore(config, backup_name, plan, destination, expected_hash))
    }

    /// Run `plan` and return the record this call wrote.
    ///
    /// `None` when the archive was never reached (missing or not a bare
    /// file name); nothing is recorded in that case.
    pub fn restore(
        &self,
        config: &EngineConfig,
        backup_name: &str,
        plan: &RestorePlan,
        destination: Option<&Path>,
        expected_hash: Option<&str>,
    ) -> Option<RestoreRecord> {
        match plan {
            RestorePlan::Full => self.run(config, backup_name, destination, expected_hash, None),
            RestorePlan::Partial(selection) => {
                let selection = Selection::new(selection);
                self.run(config, backup_name, destination, expected_hash, Some(&selection))
            }
        }
    }

    /// Fetch the newest mirrored file named `backup_name` into
    /// `destination_dir` (default: the backup directory).
    pub fn download_from_mirror(
        &self,
        config: &EngineConfig,
        backup_name: &str,
        destination_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let mirror = self
            .mirror
            .as_ref()
            .ok_or_else(|| EngineError::MirrorUnavailable("no remote mirror configured".into()))?;
        let target = destination_dir
            .unwrap_or(&config.backup_dir)
            .join(plain_name(backup_name)?);

        let candidates = mirror.find_by_name(backup_name)?;
        let newest = candidates
            .first()
            .ok_or_else(|| EngineError::NotFound(PathBuf::from(backup_name)))?;
        info!(backup = backup_name, id = %newest.id, modified = %newest.modified_time, "Downloading from mirror");
        mirror.download(&newest.id, &target)
    }

    /// Download from the mirror into the backup directory, then restore.
    pub fn restore_from_mirror(
        &self,
        config: &EngineConfig,
        backup_name: &str,
        plan: &RestorePlan,
        destination: Option<&Path>,
    ) -> bool {
        succeeded(self.fetch_and_restore(config, backup_name, plan, destination))
    }

    /// [`restore_from_mirror`](Self::restore_from_mirror) returning the
    /// record written, `None` when the download failed.
    pub fn fetch_and_restore(
        &self,
        config: &EngineConfig,
        backup_name: &str,
        plan: &RestorePlan,
        destination: Option<&Path>,
    ) -> Option<RestoreRecord> {
        match self.download_from_mirror(config, backup_name, None) {
            Ok(path) => {
                info!(backup = backup_name, path = %path.display(), "Archive fetched from mirror");
                self.restore(config, backup_name, plan, destination, None)
            }
            Err(e) => {
                error!(backup = backup_name, error = %e, "Mirror download failed");
                None
            }
        }
    }

    fn run(
        &self,
        config: &EngineConfig,
        backup_name: &str,
        destination: Option<&Path>,
        expected_hash: Option<&str>,
        selection: Option<&Selection>,
    ) -> Option<RestoreRecord> {
        let destination = destination.unwrap_or(&config.restore_dir).to_path_buf();
        let partial = selection.is_some();
        info!(backup = backup_name, destination = %destination.display(), partial, "Starting restore");

        let result = self.extract(config, backup_name, &destination, expected_hash, selection);
        let (status, details) = match &result {
            Ok(summary) => {
                info!(backup = backup_name, files = summary.files, bytes = summary.bytes, "Restore completed");
                let status = if partial {
                    RestoreStatus::OkPartial
                } else {
                    RestoreStatus::Ok
                };
                (status, success_details(summary, selection))
            }
            Err(EngineError::NotFound(path)) => {
                error!(path = %path.display(), "Backup file does not exist");
                return None;
            }
            Err(e @ EngineError::HashMismatch { .. }) => {
                error!(backup = backup_name, error = %e, "Integrity check failed, nothing extracted");
                let status = if partial {
                    RestoreStatus::FailedHashPartial
                } else {
                    RestoreStatus::FailedHash
                };
                (status, e.to_string())
            }
            Err(e) => {
                error!(backup = backup_name, error = %e, "Restore failed");
                let status = if partial {
                    RestoreStatus::FailedPartial
                } else {
                    RestoreStatus::Failed
                };
                (status, e.to_string())
            }
        };

        let record = RestoreRecord {
            backup_name: backup_name.to_string(),
            date: now_timestamp(),
            destination: destination.display().to_string(),
            status,
        };
        if let Err(e) = self.store.record_restore(&record) {
            error!(backup = backup_name, error = %e, "Could not write restore history");
            append_fallback(&config.backup_dir, "restore", &record, &e);
        }

        let message = restore_message(backup_name, status, &destination, &details)
            .to(config.recipient.clone())
            .attach(self.log_file.clone());
        if let Err(e) = self.notifier.send(&message) {
            warn!(subject = %message.subject, error = %e, "Notification not delivered");
        }

        Some(record)
    }

    fn extract(
        &self,
        config: &EngineConfig,
        backup_name: &str,
        destination: &Path,
        expected_hash: Option<&str>,
        selection: Option<&Selection>,
    ) -> Result<ExtractSummary> {
        let archive = archive_path(config, backup_name)?;
        std::fs::create_dir_all(destination)?;

        let expected = match expected_hash {
            Some(hash) => Some(hash.to_string()),
            None => self.recorded_hash(backup_name),
        };
        match expected {
            Some(hash) => {
                if !verify_digest(&archive, &hash, &config.algorithm) {
                    return Err(EngineError::HashMismatch {
                        name: backup_name.to_string(),
                        expected: hash,
                    });
                }
                info!(backup = backup_name, "Integrity check passed");
            }
            None => warn!(backup = backup_name, "No known hash, restoring without verification"),
        }

        match selection {
            None => extract_all(&archive, destination),
            Some(selection) => {
                let members = list_members(&archive)?;
                if !members.iter().any(|m| selection.matches(m)) {
                    return Err(EngineError::NoMatchingMembers(selection.prefixes().to_vec()));
                }
                extract_matching(&archive, destination, |m| selection.matches(m))
            }
        }
    }

    fn recorded_hash(&self, backup_name: &str) -> Option<String> {
        match self.store.find_backup(backup_name) {
            Ok(record) => record.and_then(|r| r.hash),
            Err(e) => {
                warn!(backup = backup_name, error = %e, "Hash lookup in history failed");
                None
            }
        }
    }
}

fn succeeded(record: Option<RestoreRecord>) -> bool {
    record.is_some_and(|r| r.status.is_success())
}

/// Reject names that are not a bare file name.
fn plain_name(backup_name: &str) -> Result<&str> {
    let is_plain = Path::new(backup_name).file_name().and_then(|n| n.to_str()) == Some(backup_name);
    if is_plain {
        Ok(backup_name)
    } else {
        Err(EngineError::NotFound(PathBuf::from(backup_name)))
    }
}

/// Path of `backup_name` in the backup directory. Fails unless the name is a
/// bare file name of an existing archive.
pub fn archive_path(config: &EngineConfig, backup_name: &str) -> Result<PathBuf> {
    let path = config.backup_dir.join(plain_name(backup_name)?);
    if path.is_file() {
        Ok(path)
    } else {
        Err(EngineError::NotFound(path))
    }
}

fn success_details(summary: &ExtractSummary, selection: Option<&Selection>) -> String {
    let mut details = format!("Files restored: {} ({}B)\n", summary.files, summary.bytes);
    if let Some(selection) = selection {
        details.push_str("Restored items:\n");
        for prefix in selection.prefixes() {
            details.push_str(&format!("- {prefix}\n"));
        }
    }
    details
}
