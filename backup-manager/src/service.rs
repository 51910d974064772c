//! Operation surface shared by the CLI and the scheduler.
//!
//! Every operation returns an [`Outcome`]: a success flag plus the affected
//! record where there is one. Nothing here panics or propagates an
//! operational failure.

use crate::config::AppConfig;
use crate::logger::LogHandle;
use backup_engine::mirror::{DirectoryMirror, RemoteMirror};
use backup_engine::models::{BackupProfile, BackupRecord, NewProfile, RestoreRecord};
use backup_engine::notify::{Notifier, OutboxNotifier, TracingNotifier};
use backup_engine::report::send_daily_report;
use backup_engine::restore::archive_path;
use backup_engine::{
    BackupEngine, EngineConfig, HistoryStore, RestoreEngine, RestorePlan, SqliteHistory,
};
use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Outcome<T> {
    pub fn success(record: T) -> Self {
        Self {
            ok: true,
            record: Some(record),
            error: None,
        }
    }

    pub fn failure(error: impl Display) -> Self {
        Self {
            ok: false,
            record: None,
            error: Some(error.to_string()),
        }
    }

    fn with_flag(ok: bool, record: Option<T>) -> Self {
        Self {
            ok,
            record,
            error: None,
        }
    }
}

impl<T> From<backup_engine::Result<T>> for Outcome<T> {
    fn from(result: backup_engine::Result<T>) -> Self {
        match result {
            Ok(record) => Outcome::success(record),
            Err(e) => {
                tracing::error!(error = %e, "Operation failed");
                Outcome::failure(e)
            }
        }
    }
}

/// Health summary: the service answered and this was the latest backup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub last_backup: Option<BackupRecord>,
}

/// Archive members and their root groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub members: Vec<String>,
    pub roots: Vec<String>,
}

pub struct BackupService {
    config: EngineConfig,
    default_sources: Vec<PathBuf>,
    store: Arc<dyn HistoryStore>,
    notifier: Arc<dyn Notifier>,
    backups: BackupEngine,
    restores: RestoreEngine,
}

impl BackupService {
    /// Wire the SQLite store, notifier and mirror described by `app`.
    pub fn from_config(app: &AppConfig, log: &LogHandle) -> anyhow::Result<Self> {
        let store: Arc<dyn HistoryStore> = Arc::new(SqliteHistory::open(&app.database.path)?);
        let notifier: Arc<dyn Notifier> = match &app.notify.outbox_dir {
            Some(dir) => Arc::new(OutboxNotifier::new(dir)),
            None => Arc::new(TracingNotifier),
        };
        let mirror: Option<Arc<dyn RemoteMirror>> = app
            .mirror
            .directory
            .as_ref()
            .map(|dir| Arc::new(DirectoryMirror::new(dir)) as Arc<dyn RemoteMirror>);

        tracing::info!(
            db = %app.database.path.display(),
            backup_dir = %app.paths.backup_dir.display(),
            mirror = mirror.is_some(),
            "Backup service ready"
        );
        Ok(Self::new(
            app.engine_config(),
            app.paths.sources.clone(),
            store,
            notifier,
            mirror,
            log.file.clone(),
        ))
    }

    pub fn new(
        config: EngineConfig,
        default_sources: Vec<PathBuf>,
        store: Arc<dyn HistoryStore>,
        notifier: Arc<dyn Notifier>,
        mirror: Option<Arc<dyn RemoteMirror>>,
        log_file: Option<PathBuf>,
    ) -> Self {
        let backups = BackupEngine::new(store.clone(), notifier.clone())
            .with_mirror(mirror.clone())
            .with_log_file(log_file.clone());
        let restores = RestoreEngine::new(store.clone(), notifier.clone())
            .with_mirror(mirror)
            .with_log_file(log_file);
        Self {
            config,
            default_sources,
            store,
            notifier,
            backups,
            restores,
        }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// Back up `sources`, or the configured default sources when empty.
    pub fn run_backup_from_sources(
        &self,
        sources: &[PathBuf],
        destination: Option<&Path>,
    ) -> Outcome<BackupRecord> {
        let valid = self
            .backups
            .collect_sources(sources, None, || self.default_sources.clone());
        match self.backups.create_backup(&self.config, &valid, destination) {
            Ok(record) => Outcome::with_flag(record.is_ok(), Some(record)),
            Err(e) => Outcome::failure(e),
        }
    }

    pub fn run_backup_from_profile(&self, profile_id: Option<i64>) -> Outcome<BackupRecord> {
        match self.backups.create_backup_from_profile(&self.config, profile_id) {
            Ok(record) => Outcome::with_flag(record.is_ok(), Some(record)),
            Err(e) => Outcome::failure(e),
        }
    }

    pub fn status(&self) -> Outcome<SystemStatus> {
        match self.store.backup_history(1) {
            Ok(mut records) => Outcome::success(SystemStatus {
                last_backup: records.pop(),
            }),
            Err(e) => Outcome::failure(e),
        }
    }

    pub fn history(&self, limit: usize) -> Outcome<Vec<BackupRecord>> {
        self.store.backup_history(limit).into()
    }

    pub fn restore_history(&self, limit: usize) -> Outcome<Vec<RestoreRecord>> {
        self.store.restore_history(limit).into()
    }

    pub fn list_profiles(&self, limit: usize) -> Outcome<Vec<BackupProfile>> {
        self.store.list_profiles(limit).into()
    }

    pub fn get_profile(&self, id: i64) -> Outcome<BackupProfile> {
        match self.store.get_profile(id) {
            Ok(Some(profile)) => Outcome::success(profile),
            Ok(None) => Outcome::failure(format!("profile {id} not found")),
            Err(e) => Outcome::failure(e),
        }
    }

    pub fn create_profile(&self, data: &NewProfile) -> Outcome<BackupProfile> {
        if data.name.trim().is_empty() {
            return Outcome::failure("profile name must not be empty");
        }
        self.store.create_profile(data).into()
    }

    pub fn set_default_profile(&self, id: i64) -> Outcome<BackupProfile> {
        match self.store.set_default_profile(id) {
            Ok(true) => self.get_profile(id),
            Ok(false) => Outcome::failure(format!("profile {id} not found")),
            Err(e) => Outcome::failure(e),
        }
    }

    pub fn list_backups(&self) -> Outcome<Vec<String>> {
        Outcome::success(self.restores.list_backups(&self.config))
    }

    pub fn preview(&self, backup_name: &str) -> Outcome<Preview> {
        let members = self.restores.preview_contents(&self.config, backup_name);
        if members.is_empty() {
            return Outcome::failure(format!("cannot read contents of {backup_name}"));
        }
        let roots = backup_engine::archive::root_groups(&members);
        Outcome::success(Preview { members, roots })
    }

    pub fn restore_full(
        &self,
        backup_name: &str,
        destination: Option<&Path>,
        expected_hash: Option<&str>,
    ) -> Outcome<RestoreRecord> {
        let record = self.restores.restore(
            &self.config,
            backup_name,
            &RestorePlan::Full,
            destination,
            expected_hash,
        );
        restore_outcome(record, backup_name)
    }

    pub fn restore_partial(
        &self,
        backup_name: &str,
        selection: &[String],
        destination: Option<&Path>,
        expected_hash: Option<&str>,
    ) -> Outcome<RestoreRecord> {
        let record = self.restores.restore(
            &self.config,
            backup_name,
            &RestorePlan::Partial(selection.to_vec()),
            destination,
            expected_hash,
        );
        restore_outcome(record, backup_name)
    }

    pub fn restore_from_mirror(
        &self,
        backup_name: &str,
        plan: &RestorePlan,
        destination: Option<&Path>,
    ) -> Outcome<RestoreRecord> {
        let record = self
            .restores
            .fetch_and_restore(&self.config, backup_name, plan, destination);
        restore_outcome(record, backup_name)
    }

    /// Apply retention with `keep`, or the configured limit.
    pub fn cleanup(&self, keep: Option<usize>) -> Outcome<usize> {
        match keep.or(self.config.max_backups) {
            Some(limit) => Outcome::success(
                self.backups
                    .cleanup_old_backups(&self.config.backup_dir, limit),
            ),
            None => Outcome::failure("no retention limit configured"),
        }
    }

    /// Verify an archive against `expected_hash` or the hash in its history record.
    pub fn verify(&self, backup_name: &str, expected_hash: Option<&str>) -> Outcome<bool> {
        let path = match archive_path(&self.config, backup_name) {
            Ok(path) => path,
            Err(e) => return Outcome::failure(e),
        };
        let expected = match expected_hash {
            Some(hash) => hash.to_string(),
            None => match self.store.find_backup(backup_name) {
                Ok(Some(BackupRecord { hash: Some(hash), .. })) => hash,
                Ok(_) => return Outcome::failure(format!("no recorded hash for {backup_name}")),
                Err(e) => return Outcome::failure(e),
            },
        };
        let ok = self
            .backups
            .verify_backup(&path, &expected, &self.config.algorithm);
        Outcome::with_flag(ok, Some(ok))
    }

    pub fn send_daily_report_now(&self) -> Outcome<()> {
        let ok = send_daily_report(
            self.store.as_ref(),
            self.notifier.as_ref(),
            self.config.recipient.clone(),
        );
        Outcome::with_flag(ok, None)
    }
}

/// The record a restore call wrote; a failure when it never reached the archive.
fn restore_outcome(record: Option<RestoreRecord>, backup_name: &str) -> Outcome<RestoreRecord> {
    match record {
        Some(record) => Outcome::with_flag(record.status.is_success(), Some(record)),
        None => Outcome::failure(format!("{backup_name} could not be read for restore")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_engine::models::{BackupStatus, RestoreStatus};
    use std::fs;
    use tempfile::TempDir;

    fn service(temp: &TempDir, max_backups: Option<usize>) -> BackupService {
        let store: Arc<dyn HistoryStore> =
            Arc::new(SqliteHistory::open(&temp.path().join("history.db")).unwrap());
        let config = EngineConfig::new(temp.path().join("backups"), temp.path().join("restore"))
            .with_max_backups(max_backups);
        BackupService::new(
            config,
            vec![temp.path().join("default")],
            store,
            Arc::new(OutboxNotifier::new(temp.path().join("outbox"))),
            None,
            None,
        )
    }

    fn seed(temp: &TempDir) -> (PathBuf, PathBuf) {
        let notes = temp.path().join("notes.txt");
        let photos = temp.path().join("photos");
        fs::create_dir_all(&photos).unwrap();
        fs::write(&notes, b"notes").unwrap();
        fs::write(photos.join("a.jpg"), b"jpeg").unwrap();
        (notes, photos)
    }

    #[test]
    fn test_backup_then_partial_restore() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, None);
        let (notes, photos) = seed(&temp);

        let outcome = service.run_backup_from_sources(&[notes, photos], None);
        assert!(outcome.ok);
        let record = outcome.record.unwrap();
        assert_eq!(record.status, BackupStatus::Ok);

        assert_eq!(service.history(10).record.unwrap(), vec![record.clone()]);
        assert_eq!(service.list_backups().record.unwrap(), vec![record.name.clone()]);
        assert_eq!(
            service.preview(&record.name).record.unwrap().roots,
            vec!["notes.txt", "photos"]
        );
        assert_eq!(service.verify(&record.name, None).record, Some(true));

        let restored = service.restore_partial(&record.name, &["photos".into()], None, None);
        assert!(restored.ok);
        assert_eq!(restored.record.unwrap().status, RestoreStatus::OkPartial);
        assert!(temp.path().join("restore/photos/a.jpg").exists());
        assert!(!temp.path().join("restore/notes.txt").exists());

        let outbox_messages = fs::read_dir(temp.path().join("outbox")).unwrap().count();
        assert_eq!(outbox_messages, 2);
    }

    #[test]
    fn test_backup_without_valid_sources() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, None);

        let outcome = service.run_backup_from_sources(&[], None);
        assert!(!outcome.ok);
        assert!(outcome.record.is_none());
        assert!(outcome.error.unwrap().contains("No valid backup sources"));
        assert!(service.history(10).record.unwrap().is_empty());
    }

    #[test]
    fn test_default_sources_are_used() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, None);
        fs::create_dir_all(temp.path().join("default")).unwrap();
        fs::write(temp.path().join("default/file.txt"), b"x").unwrap();

        let outcome = service.run_backup_from_sources(&[], None);
        assert!(outcome.ok);
        assert!(outcome.record.unwrap().sources.ends_with("default"));
    }

    #[test]
    fn test_retention_after_backup() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, Some(1));
        let backups = temp.path().join("backups");
        fs::create_dir_all(&backups).unwrap();
        fs::write(backups.join("Backup_2000_01_01-00_00_00.zip"), b"old").unwrap();
        fs::File::options()
            .write(true)
            .open(backups.join("Backup_2000_01_01-00_00_00.zip"))
            .unwrap()
            .set_modified(std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(60))
            .unwrap();
        let (notes, _) = seed(&temp);

        let record = service.run_backup_from_sources(&[notes], None).record.unwrap();
        assert_eq!(service.list_backups().record.unwrap(), vec![record.name]);
        assert_eq!(service.cleanup(None).record, Some(0));
    }

    #[test]
    fn test_cleanup_needs_a_limit() {
        let temp = TempDir::new().unwrap();
        assert!(!service(&temp, None).cleanup(None).ok);
    }

    #[test]
    fn test_profiles() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, None);
        let (_, photos) = seed(&temp);

        let mut data = NewProfile::new(
            "photos",
            vec![photos.display().to_string()],
            temp.path().join("profile-backups").display().to_string(),
            "",
        );
        data.is_default = true;
        let created = service.create_profile(&data).record.unwrap();
        let other = service
            .create_profile(&NewProfile::new("other", vec![], "/b", "/r"))
            .record
            .unwrap();

        assert!(service.set_default_profile(other.id).ok);
        assert!(service.set_default_profile(created.id).ok);
        assert!(!service.set_default_profile(999).ok);
        assert!(service.get_profile(created.id).record.unwrap().is_default);
        assert!(!service.get_profile(other.id).record.unwrap().is_default);
        assert_eq!(service.list_profiles(10).record.unwrap().len(), 2);
        assert!(!service.create_profile(&NewProfile::new(" ", vec![], "/b", "/r")).ok);

        let outcome = service.run_backup_from_profile(None);
        assert!(outcome.ok);
        assert!(outcome.record.unwrap().path.contains("profile-backups"));
        assert!(!service.run_backup_from_profile(Some(other.id)).ok);
    }

    #[test]
    fn test_daily_report_now() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, None);
        assert!(service.send_daily_report_now().ok);
        assert_eq!(fs::read_dir(temp.path().join("outbox")).unwrap().count(), 1);
    }

    #[test]
    fn test_status_reports_last_backup() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, None);

        let empty = service.status();
        assert!(empty.ok);
        assert_eq!(empty.record.unwrap().last_backup, None);

        let (notes, _) = seed(&temp);
        let record = service.run_backup_from_sources(&[notes], None).record.unwrap();
        assert_eq!(service.status().record.unwrap().last_backup, Some(record));
    }

    #[test]
    fn test_verify_rejects_names_outside_backup_dir() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, None);
        fs::write(temp.path().join("outside.zip"), b"zip").unwrap();

        let outcome = service.verify("../outside.zip", Some(&"0".repeat(64)));
        assert!(!outcome.ok);
        assert!(outcome.record.is_none());
        assert!(outcome.error.is_some());
    }

    /// Records a second restore right after every one it is asked to store,
    /// as a concurrent caller would.
    struct InterleavingStore {
        inner: SqliteHistory,
    }

    impl HistoryStore for InterleavingStore {
        fn record_backup(&self, record: &BackupRecord) -> backup_engine::Result<()> {
            self.inner.record_backup(record)
        }
        fn find_backup(&self, name: &str) -> backup_engine::Result<Option<BackupRecord>> {
            self.inner.find_backup(name)
        }
        fn backup_history(&self, limit: usize) -> backup_engine::Result<Vec<BackupRecord>> {
            self.inner.backup_history(limit)
        }
        fn backups_since(&self, since: &str) -> backup_engine::Result<Vec<BackupRecord>> {
            self.inner.backups_since(since)
        }
        fn record_restore(&self, record: &RestoreRecord) -> backup_engine::Result<()> {
            self.inner.record_restore(record)?;
            let other = RestoreRecord {
                destination: "/somewhere/else".into(),
                status: RestoreStatus::Failed,
                ..record.clone()
            };
            self.inner.record_restore(&other)
        }
        fn restore_history(&self, limit: usize) -> backup_engine::Result<Vec<RestoreRecord>> {
            self.inner.restore_history(limit)
        }
        fn get_profile(&self, id: i64) -> backup_engine::Result<Option<BackupProfile>> {
            self.inner.get_profile(id)
        }
        fn default_profile(&self) -> backup_engine::Result<Option<BackupProfile>> {
            self.inner.default_profile()
        }
        fn list_profiles(&self, limit: usize) -> backup_engine::Result<Vec<BackupProfile>> {
            self.inner.list_profiles(limit)
        }
        fn create_profile(&self, data: &NewProfile) -> backup_engine::Result<BackupProfile> {
            self.inner.create_profile(data)
        }
        fn update_profile(
            &self,
            id: i64,
            data: &backup_engine::models::UpdateProfile,
        ) -> backup_engine::Result<Option<BackupProfile>> {
            self.inner.update_profile(id, data)
        }
        fn set_default_profile(&self, id: i64) -> backup_engine::Result<bool> {
            self.inner.set_default_profile(id)
        }
        fn delete_profile(&self, id: i64) -> backup_engine::Result<bool> {
            self.inner.delete_profile(id)
        }
    }

    #[test]
    fn test_restore_outcome_is_the_calls_own_record() {
        let temp = TempDir::new().unwrap();
        let store: Arc<dyn HistoryStore> = Arc::new(InterleavingStore {
            inner: SqliteHistory::open(&temp.path().join("history.db")).unwrap(),
        });
        let service = BackupService::new(
            EngineConfig::new(temp.path().join("backups"), temp.path().join("restore")),
            Vec::new(),
            store.clone(),
            Arc::new(TracingNotifier),
            None,
            None,
        );
        let (notes, _) = seed(&temp);
        let backup = service.run_backup_from_sources(&[notes], None).record.unwrap();

        let destination = temp.path().join("mine");
        let outcome = service.restore_full(&backup.name, Some(&destination), None);
        assert!(outcome.ok);
        let record = outcome.record.unwrap();
        assert_eq!(record.status, RestoreStatus::Ok);
        assert_eq!(record.destination, destination.display().to_string());

        let newest = store.restore_history(1).unwrap().pop().unwrap();
        assert_eq!(newest.destination, "/somewhere/else");

        let missing = service.restore_full("Backup_missing.zip", None, None);
        assert!(!missing.ok);
        assert!(missing.record.is_none());
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome: Outcome<usize> = Outcome::success(3);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"ok": true, "record": 3})
        );
        let failed: Outcome<usize> = Outcome::failure("boom");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"ok": false, "error": "boom"})
        );
    }
}
