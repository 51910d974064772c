//! Backup orchestration.
//!
//! One `create_backup` call always ends in exactly one history write and one
//! notification, whether the archive was built or not.

use crate::archive::create_archive;
use crate::checksum::{build_manifest, compute_digest, verify_digest, DEFAULT_CHUNK_SIZE};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::fs::walker::absolute_lexical;
use crate::locks::DestinationLocks;
use crate::manifest::manifest_path_for;
use crate::mirror::RemoteMirror;
use crate::models::{join_sources, BackupRecord, BackupStatus, DATE_FORMAT};
use crate::notify::{backup_message, Notification, Notifier};
use crate::store::{append_fallback, HistoryStore};
use crate::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// strftime pattern of the timestamp embedded in archive names.
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y_%m_%d-%H_%M_%S";

pub fn archive_name(timestamp: &str) -> String {
    format!("Backup_{timestamp}.zip")
}

pub struct BackupEngine {
    store: Arc<dyn HistoryStore>,
    notifier: Arc<dyn Notifier>,
    mirror: Option<Arc<dyn RemoteMirror>>,
    log_file: Option<PathBuf>,
    locks: Arc<DestinationLocks>,
}

/// What a successful archive run produced before it is recorded.
struct Produced {
    size: u64,
    hash: String,
    manifest: Option<PathBuf>,
    mirror_link: Option<String>,
}

impl BackupEngine {
    pub fn new(store: Arc<dyn HistoryStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            mirror: None,
            log_file: None,
            locks: Arc::new(DestinationLocks::new()),
        }
    }

    pub fn with_mirror(mut self, mirror: Option<Arc<dyn RemoteMirror>>) -> Self {
        self.mirror = mirror;
        self
    }

    /// Log file attached to notifications, usually today's log.
    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    /// Share destination locks with other engines writing the same directories.
    pub fn with_locks(mut self, locks: Arc<DestinationLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Merge candidate sources and keep those that exist.
    ///
    /// Priority: the explicit list, then the single legacy path (unless
    /// already listed), then `fallback` when both gave nothing.
    pub fn collect_sources<F>(
        &self,
        explicit_sources: &[PathBuf],
        explicit_source: Option<&Path>,
        fallback: F,
    ) -> Vec<PathBuf>
    where
        F: FnOnce() -> Vec<PathBuf>,
    {
        let mut candidates: Vec<PathBuf> = explicit_sources.to_vec();
        if let Some(source) = explicit_source {
            if !candidates.iter().any(|c| c == source) {
                candidates.push(source.to_path_buf());
            }
        }
        if candidates.is_empty() {
            candidates = fallback();
        }

        candidates
            .into_iter()
            .filter(|path| {
                let exists = path.exists();
                if !exists {
                    error!(error = %EngineError::SourceNotFound(path.clone()), "Source skipped");
                }
                exists
            })
            .collect()
    }

    /// Archive `sources` into `destination` (or the configured backup dir).
    ///
    /// Returns the written record, `OK` or `FAILED`. The only error is
    /// [`EngineError::NoValidSources`], raised before anything is written.
    pub fn create_backup(
        &self,
        config: &EngineConfig,
        sources: &[PathBuf],
        destination: Option<&Path>,
    ) -> Result<BackupRecord> {
        if sources.is_empty() {
            error!("No valid source paths, backup aborted");
            return Err(EngineError::NoValidSources);
        }

        let destination = destination.unwrap_or(&config.backup_dir).to_path_buf();
        let started = Local::now();
        let name = archive_name(&started.format(ARCHIVE_TIMESTAMP_FORMAT).to_string());
        let archive_path = destination.join(&name);
        let date = started.format(DATE_FORMAT).to_string();
        let source_list = join_sources(sources.iter().map(|s| absolute_display(s)));

        info!(backup = %name, sources = sources.len(), "Creating backup");

        let outcome = std::fs::create_dir_all(&destination)
            .map_err(EngineError::from)
            .and_then(|()| {
                let lock = self.locks.for_dir(&destination);
                let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
                self.produce(config, sources, &destination, &name, &archive_path)
            });

        let record = match outcome {
            Ok(produced) => {
                let record = BackupRecord {
                    name: name.clone(),
                    date,
                    path: absolute_display(&archive_path),
                    size: produced.size,
                    hash: Some(produced.hash),
                    status: BackupStatus::Ok,
                    sources: source_list,
                };
                info!(
                    backup = %record.name,
                    size = record.size,
                    hash = record.hash.as_deref().unwrap_or("-"),
                    "Backup completed"
                );
                self.record(&destination, &record);

                let mut attachments: Vec<PathBuf> = produced.manifest.into_iter().collect();
                attachments.extend(self.log_file.clone());
                let message = backup_message(
                    &record.name,
                    record.status,
                    Some(&record),
                    produced.mirror_link.as_deref(),
                    None,
                )
                .to(config.recipient.clone())
                .attach(attachments);
                self.notify(&message);
                record
            }
            Err(e) => {
                error!(backup = %name, error = %e, "Backup failed");
                let record = BackupRecord {
                    name: name.clone(),
                    date,
                    path: absolute_display(&archive_path),
                    size: 0,
                    hash: None,
                    status: BackupStatus::Failed,
                    sources: source_list,
                };
                self.record(&destination, &record);

                let message =
                    backup_message(&name, BackupStatus::Failed, None, None, Some(&e.to_string()))
                        .to(config.recipient.clone())
                        .attach(self.log_file.clone());
                self.notify(&message);
                record
            }
        };

        if record.is_ok() {
            if let Some(limit) = config.max_backups {
                self.cleanup_old_backups(&destination, limit);
            }
        }
        Ok(record)
    }

    fn produce(
        &self,
        config: &EngineConfig,
        sources: &[PathBuf],
        destination: &Path,
        name: &str,
        archive_path: &Path,
    ) -> Result<Produced> {
        let manifest = match sources {
            [only] if only.is_dir() => self.write_manifest(config, only, destination, name),
            _ => {
                debug!("Manifest skipped: more than one source or a single file");
                None
            }
        };

        create_archive(sources, archive_path)?;

        let size = std::fs::metadata(archive_path)?.len();
        let hash = compute_digest(archive_path, &config.algorithm, DEFAULT_CHUNK_SIZE)?;

        let mirror_link = self.mirror.as_ref().and_then(|mirror| {
            mirror
                .upload(archive_path)
                .map_err(|e| warn!(backup = %name, error = %e, "Mirror upload failed"))
                .ok()
        });

        Ok(Produced {
            size,
            hash,
            manifest,
            mirror_link,
        })
    }

    fn write_manifest(
        &self,
        config: &EngineConfig,
        source: &Path,
        destination: &Path,
        name: &str,
    ) -> Option<PathBuf> {
        let path = manifest_path_for(destination, name)?;
        let result = build_manifest(source, &config.algorithm).and_then(|m| m.save(&path));
        match result {
            Ok(()) => {
                info!(manifest = %path.display(), "Manifest saved");
                Some(path)
            }
            Err(e) => {
                error!(source = %source.display(), error = %e, "Manifest not created");
                None
            }
        }
    }

    fn record(&self, backup_dir: &Path, record: &BackupRecord) {
        if let Err(e) = self.store.record_backup(record) {
            error!(backup = %record.name, error = %e, "Could not write backup history");
            append_fallback(backup_dir, "backup", record, &e);
        }
    }

    fn notify(&self, message: &Notification) {
        if let Err(e) = self.notifier.send(message) {
            warn!(subject = %message.subject, error = %e, "Notification not delivered");
        }
    }

    /// Resolve a profile (explicit id, else the default) and back it up.
    ///
    /// A missing profile or an empty source list fails before any record is
    /// written.
    pub fn create_backup_from_profile(
        &self,
        base: &EngineConfig,
        profile_id: Option<i64>,
    ) -> Result<BackupRecord> {
        let profile = match profile_id {
            Some(id) => self.store.get_profile(id)?,
            None => self.store.default_profile()?,
        };
        let Some(profile) = profile else {
            let which = profile_id.map_or_else(|| "default".to_string(), |id| id.to_string());
            error!(profile = %which, "Backup profile not found");
            return Err(EngineError::Config(format!("backup profile {which} not found")));
        };

        let listed: Vec<PathBuf> = profile.source_list().into_iter().map(PathBuf::from).collect();
        if listed.is_empty() {
            error!(profile = %profile.name, "Profile has no sources");
            return Err(EngineError::NoValidSources);
        }
        let sources = self.collect_sources(&listed, None, Vec::new);

        let config = base.with_profile(&profile);
        info!(profile = %profile.name, id = profile.id, "Running profile backup");
        self.create_backup(&config, &sources, None)
    }

    /// Keep the newest `limit` archives in `dir` (by modification time) and
    /// delete the rest along with their manifests. Returns how many archives
    /// were removed.
    pub fn cleanup_old_backups(&self, dir: &Path, limit: usize) -> usize {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Backup directory missing, nothing to clean");
            return 0;
        }
        let lock = self.locks.for_dir(dir);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "Cannot list backups");
                return 0;
            }
        };
        let mut archives: Vec<(PathBuf, SystemTime)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "zip"))
            .map(|p| {
                let modified = std::fs::metadata(&p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (p, modified)
            })
            .collect();

        if archives.len() <= limit {
            return 0;
        }
        archives.sort_by(|a, b| a.1.cmp(&b.1));
        let excess = archives.len() - limit;

        let mut removed = 0;
        for (path, _) in archives.into_iter().take(excess) {
            if let Err(e) = std::fs::remove_file(&path) {
                error!(path = %path.display(), error = %e, "Cannot delete old backup");
                continue;
            }
            removed += 1;
            info!(path = %path.display(), "Removed old backup");

            let manifest = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| manifest_path_for(dir, n));
            if let Some(manifest) = manifest.filter(|m| m.exists()) {
                match std::fs::remove_file(&manifest) {
                    Ok(()) => info!(path = %manifest.display(), "Removed matching manifest"),
                    Err(e) => error!(path = %manifest.display(), error = %e, "Cannot delete manifest"),
                }
            }
        }
        debug!(dir = %dir.display(), removed, "Retention applied");
        removed
    }

    /// Existence check, then a digest comparison.
    pub fn verify_backup(&self, path: &Path, expected_hash: &str, algorithm: &str) -> bool {
        if !path.exists() {
            error!(path = %path.display(), "Backup file does not exist");
            return false;
        }
        verify_digest(path, expected_hash, algorithm)
    }
}

fn absolute_display(path: &Path) -> String {
    absolute_lexical(path).display().to_string()
}
