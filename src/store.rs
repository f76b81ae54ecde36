//! # Session Store Module
//!
//! Manages the on-disk layout of recorded sessions: one directory per
//! session under the storage root, named by the session's Unix start
//! timestamp, holding one well-known file per recorded signal.
//!
//! ```text
//! <storage_root>/
//! ├── 1700000000/
//! │   ├── gsr.bin
//! │   └── accel.bin
//! └── 1700000321/
//!     └── ppgw.bin
//! ```
//!
//! Directories whose names do not parse as a positive integer are treated as
//! foreign and silently skipped by enumeration, never deleted by `wipe_all`.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::signal::SignalKind;

/// One entry of the session index, emitted to the external transport.
#[derive(Debug, Clone, Serialize)]
pub struct SessionIndexRecord {
    /// Session start, Unix seconds (the directory name)
    pub timestamp: i64,
    /// Signal kinds inferred from which well-known files are present
    pub signal_mask: u8,
    /// Sum of all file sizes in the session directory
    pub size_bytes: u64,
}

/// Filesystem manager for the session directory tree.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, timestamp: i64) -> PathBuf {
        self.root.join(timestamp.to_string())
    }

    /// Creates the directory for a starting session (and the storage root if
    /// this is the first session ever).
    pub fn create_session_dir(&self, timestamp: i64) -> Result<PathBuf, StorageError> {
        let dir = self.session_dir(timestamp);
        fs::create_dir_all(&dir).map_err(StorageError::DirCreate)?;
        Ok(dir)
    }

    /// Enumerates stored sessions, oldest first.
    ///
    /// Directory names that do not parse as a positive integer are skipped
    /// without error; so is anything that is not a directory. The signal
    /// mask is inferred from which well-known filenames are present.
    pub fn scan(&self) -> Vec<SessionIndexRecord> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            // Root not created yet means no sessions
            Err(_) => return Vec::new(),
        };

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let timestamp = match entry.file_name().to_str().and_then(|n| n.parse::<i64>().ok()) {
                Some(ts) if ts > 0 => ts,
                _ => {
                    log::debug!("Skipping foreign directory: {}", path.display());
                    continue;
                }
            };

            let mut signal_mask = 0u8;
            let mut size_bytes = 0u64;
            if let Ok(files) = fs::read_dir(&path) {
                for file in files.flatten() {
                    if let Ok(meta) = file.metadata() {
                        size_bytes += meta.len();
                    }
                    if let Some(kind) = file
                        .file_name()
                        .to_str()
                        .and_then(SignalKind::from_file_name)
                    {
                        signal_mask |= kind.bit();
                    }
                }
            }

            records.push(SessionIndexRecord {
                timestamp,
                signal_mask,
                size_bytes,
            });
        }
        records.sort_by_key(|r| r.timestamp);
        records
    }

    /// Total bytes held by all stored sessions.
    pub fn total_usage_bytes(&self) -> u64 {
        self.scan().iter().map(|r| r.size_bytes).sum()
    }

    /// Deletes one session: every file inside its directory, then the
    /// directory itself.
    pub fn delete_session(&self, timestamp: i64) -> Result<(), StorageError> {
        let dir = self.session_dir(timestamp);
        if !dir.is_dir() {
            return Err(StorageError::SessionNotFound(timestamp));
        }

        let entries = fs::read_dir(&dir).map_err(StorageError::Remove)?;
        for entry in entries.flatten() {
            fs::remove_file(entry.path()).map_err(StorageError::Remove)?;
        }
        fs::remove_dir(&dir).map_err(StorageError::Remove)?;
        log::info!("Deleted session {}", timestamp);
        Ok(())
    }

    /// Deletes every stored session, continuing past individual failures.
    /// Returns the number of sessions removed.
    pub fn wipe_all(&self) -> Result<usize, StorageError> {
        let mut removed = 0;
        for record in self.scan() {
            match fs::remove_dir_all(self.session_dir(record.timestamp)) {
                Ok(()) => removed += 1,
                Err(e) => {
                    log::warn!("Failed to delete session {}: {}", record.timestamp, e);
                }
            }
        }
        log::info!("Wiped {} sessions", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed_session(root: &Path, timestamp: i64, files: &[(&str, usize)]) {
        let dir = root.join(timestamp.to_string());
        fs::create_dir_all(&dir).unwrap();
        for (name, size) in files {
            fs::write(dir.join(name), vec![0u8; *size]).unwrap();
        }
    }

    #[test]
    fn test_scan_empty_root() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::new(tmp.path().join("missing"));
        assert!(store.scan().is_empty());
        assert_eq!(store.total_usage_bytes(), 0);
    }

    #[test]
    fn test_scan_infers_mask_and_size() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::new(tmp.path().to_path_buf());
        seed_session(tmp.path(), 1_700_000_000, &[("gsr.bin", 100), ("accel.bin", 50)]);
        seed_session(tmp.path(), 1_700_000_321, &[("ppgw.bin", 200)]);

        let records = store.scan();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, 1_700_000_000);
        assert_eq!(
            records[0].signal_mask,
            SignalKind::Gsr.bit() | SignalKind::ImuAccel.bit()
        );
        assert_eq!(records[0].size_bytes, 150);
        assert_eq!(records[1].signal_mask, SignalKind::PpgWrist.bit());
        assert_eq!(store.total_usage_bytes(), 350);
    }

    #[test]
    fn test_scan_skips_malformed_names() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::new(tmp.path().to_path_buf());
        seed_session(tmp.path(), 1_700_000_000, &[("gsr.bin", 4)]);
        fs::create_dir(tmp.path().join("tmp")).unwrap();
        fs::create_dir(tmp.path().join("-5")).unwrap();
        fs::write(tmp.path().join("stray.txt"), b"x").unwrap();

        let records = store.scan();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 1_700_000_000);
    }

    #[test]
    fn test_delete_session() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::new(tmp.path().to_path_buf());
        seed_session(tmp.path(), 42, &[("gsr.bin", 8), ("gyro.bin", 8)]);

        assert!(store.delete_session(42).is_ok());
        assert!(!tmp.path().join("42").exists());
        assert!(matches!(
            store.delete_session(42),
            Err(StorageError::SessionNotFound(42))
        ));
    }

    #[test]
    fn test_wipe_all_removes_sessions_only() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::new(tmp.path().to_path_buf());
        seed_session(tmp.path(), 100, &[("gsr.bin", 4)]);
        seed_session(tmp.path(), 200, &[("accel.bin", 6)]);
        fs::create_dir(tmp.path().join("tmp")).unwrap();

        assert_eq!(store.wipe_all().unwrap(), 2);
        assert!(store.scan().is_empty());
        // Foreign directory untouched
        assert!(tmp.path().join("tmp").exists());
    }
}
