//! In-memory collaborators for engine tests.

use crate::error::EngineError;
use crate::models::{
    join_sources, BackupProfile, BackupRecord, NewProfile, RestoreRecord, UpdateProfile,
};
use crate::notify::{Notification, Notifier};
use crate::store::HistoryStore;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryHistory {
    backups: Mutex<Vec<BackupRecord>>,
    restores: Mutex<Vec<RestoreRecord>>,
    profiles: Mutex<Vec<BackupProfile>>,
    fail_writes: AtomicBool,
}

impl MemoryHistory {
    /// A store whose writes all fail.
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    pub fn backups(&self) -> Vec<BackupRecord> {
        self.backups.lock().unwrap().clone()
    }

    pub fn restores(&self) -> Vec<RestoreRecord> {
        self.restores.lock().unwrap().clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(EngineError::HistoryStore("store is read-only".into()))
        } else {
            Ok(())
        }
    }
}

impl HistoryStore for MemoryHistory {
    fn record_backup(&self, record: &BackupRecord) -> Result<()> {
        self.check_writable()?;
        self.backups.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn find_backup(&self, name: &str) -> Result<Option<BackupRecord>> {
        Ok(self.backups.lock().unwrap().iter().rev().find(|r| r.name == name).cloned())
    }

    fn backup_history(&self, limit: usize) -> Result<Vec<BackupRecord>> {
        Ok(self.backups.lock().unwrap().iter().rev().take(limit).cloned().collect())
    }

    fn backups_since(&self, since: &str) -> Result<Vec<BackupRecord>> {
        Ok(self
            .backups
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.date.as_str() >= since)
            .cloned()
            .collect())
    }

    fn record_restore(&self, record: &RestoreRecord) -> Result<()> {
        self.check_writable()?;
        self.restores.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn restore_history(&self, limit: usize) -> Result<Vec<RestoreRecord>> {
        Ok(self.restores.lock().unwrap().iter().rev().take(limit).cloned().collect())
    }

    fn get_profile(&self, id: i64) -> Result<Option<BackupProfile>> {
        Ok(self.profiles.lock().unwrap().iter().find(|p| p.id == id).cloned())
    }

    fn default_profile(&self) -> Result<Option<BackupProfile>> {
        Ok(self.profiles.lock().unwrap().iter().find(|p| p.is_default).cloned())
    }

    fn list_profiles(&self, limit: usize) -> Result<Vec<BackupProfile>> {
        Ok(self.profiles.lock().unwrap().iter().rev().take(limit).cloned().collect())
    }

    fn create_profile(&self, data: &NewProfile) -> Result<BackupProfile> {
        self.check_writable()?;
        let mut profiles = self.profiles.lock().unwrap();
        if data.is_default {
            profiles.iter_mut().for_each(|p| p.is_default = false);
        }
        let profile = BackupProfile {
            id: profiles.iter().map(|p| p.id).max().unwrap_or(0) + 1,
            name: data.name.clone(),
            sources: join_sources(&data.sources),
            backup_directory: data.backup_directory.clone(),
            restore_directory: data.restore_directory.clone(),
            backup_frequency: data.backup_frequency.clone(),
            daily_report_enable: data.daily_report_enable,
            daily_report_time: data.daily_report_time.clone(),
            recipient_email: data.recipient_email.clone(),
            is_default: data.is_default,
            created_at: String::new(),
            updated_at: String::new(),
        };
        profiles.push(profile.clone());
        Ok(profile)
    }

    fn update_profile(&self, id: i64, data: &UpdateProfile) -> Result<Option<BackupProfile>> {
        self.check_writable()?;
        let mut profiles = self.profiles.lock().unwrap();
        let Some(profile) = profiles.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(name) = &data.name {
            profile.name = name.clone();
        }
        if let Some(sources) = &data.sources {
            profile.sources = join_sources(sources);
        }
        if let Some(dir) = &data.backup_directory {
            profile.backup_directory = dir.clone();
        }
        if let Some(dir) = &data.restore_directory {
            profile.restore_directory = dir.clone();
        }
        if let Some(frequency) = &data.backup_frequency {
            profile.backup_frequency = frequency.clone();
        }
        if let Some(enable) = data.daily_report_enable {
            profile.daily_report_enable = enable;
        }
        if let Some(time) = &data.daily_report_time {
            profile.daily_report_time = time.clone();
        }
        if let Some(recipient) = &data.recipient_email {
            profile.recipient_email = recipient.clone();
        }
        Ok(Some(profile.clone()))
    }

    fn set_default_profile(&self, id: i64) -> Result<bool> {
        self.check_writable()?;
        let mut profiles = self.profiles.lock().unwrap();
        if !profiles.iter().any(|p| p.id == id) {
            return Ok(false);
        }
        profiles.iter_mut().for_each(|p| p.is_default = p.id == id);
        Ok(true)
    }

    fn delete_profile(&self, id: i64) -> Result<bool> {
        self.check_writable()?;
        let mut profiles = self.profiles.lock().unwrap();
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        Ok(profiles.len() != before)
    }
}

/// Keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notification: &Notification) -> Result<()> {
        if self.fail {
            return Err(EngineError::Notification("relay down".into()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
