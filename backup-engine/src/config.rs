//! Engine configuration.
//!
//! An [`EngineConfig`] is an immutable value handed to each operation.
//! Profile overrides derive a new value instead of patching a shared one.

use crate::checksum::DEFAULT_ALGORITHM;
use crate::models::BackupProfile;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub backup_dir: PathBuf,
    pub restore_dir: PathBuf,
    /// Checksum algorithm for archives and manifests.
    pub algorithm: String,
    pub recipient: Option<String>,
    /// Retention limit applied after each successful backup.
    pub max_backups: Option<usize>,
}

impl EngineConfig {
    pub fn new(backup_dir: impl Into<PathBuf>, restore_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            restore_dir: restore_dir.into(),
            algorithm: DEFAULT_ALGORITHM.to_string(),
            recipient: None,
            max_backups: None,
        }
    }

    pub fn with_recipient(mut self, recipient: Option<String>) -> Self {
        self.recipient = recipient;
        self
    }

    pub fn with_max_backups(mut self, max_backups: Option<usize>) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Derive the configuration a profile runs with.
    ///
    /// Blank profile fields keep the base value.
    pub fn with_profile(&self, profile: &BackupProfile) -> Self {
        let mut derived = self.clone();
        if let Some(recipient) = profile.recipient_email.as_deref().map(str::trim) {
            if !recipient.is_empty() {
                derived.recipient = Some(recipient.to_string());
            }
        }
        if !profile.backup_directory.trim().is_empty() {
            derived.backup_dir = PathBuf::from(profile.backup_directory.trim());
        }
        if !profile.restore_directory.trim().is_empty() {
            derived.restore_dir = PathBuf::from(profile.restore_directory.trim());
        }
        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(recipient: Option<&str>, backup_dir: &str) -> BackupProfile {
        BackupProfile {
            id: 1,
            name: "p".into(),
            sources: "/data".into(),
            backup_directory: backup_dir.into(),
            restore_directory: String::new(),
            backup_frequency: "daily".into(),
            daily_report_enable: false,
            daily_report_time: "8:00".into(),
            recipient_email: recipient.map(String::from),
            is_default: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_profile_overrides_do_not_touch_base() {
        let base = EngineConfig::new("/backups", "/restore")
            .with_recipient(Some("base@example.com".into()));
        let derived = base.with_profile(&profile(Some("me@example.com"), "/elsewhere"));

        assert_eq!(derived.recipient.as_deref(), Some("me@example.com"));
        assert_eq!(derived.backup_dir, PathBuf::from("/elsewhere"));
        assert_eq!(derived.restore_dir, PathBuf::from("/restore"));
        assert_eq!(base.recipient.as_deref(), Some("base@example.com"));
        assert_eq!(base.backup_dir, PathBuf::from("/backups"));
    }

    #[test]
    fn test_blank_recipient_keeps_base() {
        let base = EngineConfig::new("/b", "/r").with_recipient(Some("base@example.com".into()));
        let derived = base.with_profile(&profile(Some("  "), ""));
        assert_eq!(derived, base);
    }
}
