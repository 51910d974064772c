//! Per-destination locks.
//!
//! Backups and retention cleanup targeting the same directory run one at a
//! time; different directories proceed independently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct DestinationLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DestinationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `dir`. Paths are canonicalized when possible so
    /// spellings of the same directory share one lock.
    pub fn for_dir(&self, dir: &Path) -> Arc<Mutex<()>> {
        let key = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_same_dir_shares_lock() {
        let temp = TempDir::new().unwrap();
        let locks = DestinationLocks::new();
        let a = locks.for_dir(temp.path());
        let b = locks.for_dir(&temp.path().join("."));
        assert!(Arc::ptr_eq(&a, &b));

        let other = locks.for_dir(Path::new("/some/other/dir"));
        assert!(!Arc::ptr_eq(&a, &other));
    }
}
