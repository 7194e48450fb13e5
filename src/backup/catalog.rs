//! Listing and retention for the backup store
//!
//! Age comes from directory mtimes; nothing here reads or writes the working
//! tree.

use crate::error::{FixError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub backup_id: String,
    pub created_at: DateTime<Utc>,
    pub file_count: usize,
    pub total_size: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub removed: Vec<String>,
    pub kept: usize,
    /// `(backup_id, error)` for directories that could not be removed
    pub errors: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct BackupCatalog {
    store_dir: PathBuf,
}

impl BackupCatalog {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
        }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// All backups, newest first. A missing store is just empty.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let mut backups = Vec::new();
        for (backup_id, path, modified) in self.backup_dirs()? {
            let (file_count, total_size) = dir_usage(&path);
            backups.push(BackupInfo {
                backup_id,
                created_at: DateTime::<Utc>::from(modified),
                file_count,
                total_size,
                path,
            });
        }
        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.backup_id.cmp(&a.backup_id))
        });
        Ok(backups)
    }

    /// Delete backup directories whose mtime is more than `keep_days` old.
    pub fn cleanup_old_backups(&self, keep_days: u64) -> Result<CleanupSummary> {
        let max_age = Duration::from_secs(keep_days.saturating_mul(SECS_PER_DAY));
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut summary = CleanupSummary::default();
        for (backup_id, path, modified) in self.backup_dirs()? {
            if modified >= cutoff {
                summary.kept += 1;
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    tracing::info!(backup_id = %backup_id, "removed expired backup");
                    summary.removed.push(backup_id);
                }
                Err(err) => {
                    tracing::warn!(backup_id = %backup_id, error = %err, "failed to remove expired backup");
                    summary.errors.push((backup_id, err.to_string()));
                }
            }
        }
        summary.removed.sort();
        Ok(summary)
    }

    fn backup_dirs(&self) -> Result<Vec<(String, PathBuf, SystemTime)>> {
        let entries = match fs::read_dir(&self.store_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(FixError::Store {
                    path: self.store_dir.clone(),
                    source,
                })
            }
        };

        let mut dirs = Vec::new();
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            let Ok(modified) = meta.modified() else {
                continue;
            };
            let backup_id = entry.file_name().to_string_lossy().to_string();
            dirs.push((backup_id, entry.path(), modified));
        }
        Ok(dirs)
    }
}

fn dir_usage(dir: &Path) -> (usize, u64) {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(count, size), entry| {
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            (count + 1, size + len)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_backup(store: &Path, id: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = store.join(id);
        fs::create_dir_all(&dir).unwrap();
        for (name, content) in files {
            let path = dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    fn set_mtime(dir: &Path, when: SystemTime) {
        let handle = fs::File::open(dir).unwrap();
        handle.set_modified(when).unwrap();
    }

    #[test]
    fn test_missing_store_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = BackupCatalog::new(tmp.path().join("nope"));
        assert!(catalog.list_backups().unwrap().is_empty());
        assert_eq!(catalog.cleanup_old_backups(1).unwrap(), CleanupSummary::default());
    }

    #[test]
    fn test_list_counts_files_and_sizes() {
        let tmp = tempfile::tempdir().unwrap();
        let older = make_backup(tmp.path(), "older", &[("a.txt", "12345")]);
        let newer = make_backup(
            tmp.path(),
            "newer",
            &[("src/x.py", "abc"), ("src/deep/y.py", "de")],
        );
        fs::write(tmp.path().join("stray.txt"), "not a backup").unwrap();
        set_mtime(&older, SystemTime::now() - Duration::from_secs(3600));
        set_mtime(&newer, SystemTime::now());

        let catalog = BackupCatalog::new(tmp.path());
        let backups = catalog.list_backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].backup_id, "newer");
        assert_eq!(backups[0].file_count, 2);
        assert_eq!(backups[0].total_size, 5);
        assert_eq!(backups[1].backup_id, "older");
        assert_eq!(backups[1].file_count, 1);
        assert_eq!(backups[1].total_size, 5);
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let tmp = tempfile::tempdir().unwrap();
        let stale = make_backup(tmp.path(), "stale", &[("a.txt", "a")]);
        let fresh = make_backup(tmp.path(), "fresh", &[("b.txt", "b")]);
        set_mtime(&stale, SystemTime::now() - Duration::from_secs(10 * SECS_PER_DAY));
        set_mtime(&fresh, SystemTime::now());

        let catalog = BackupCatalog::new(tmp.path());
        let summary = catalog.cleanup_old_backups(7).unwrap();

        assert_eq!(summary.removed, vec!["stale".to_string()]);
        assert_eq!(summary.kept, 1);
        assert!(summary.errors.is_empty());
        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_cleanup_zero_days_keeps_nothing_old() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = make_backup(tmp.path(), "yesterday", &[("a.txt", "a")]);
        set_mtime(&dir, SystemTime::now() - Duration::from_secs(SECS_PER_DAY));

        let summary = BackupCatalog::new(tmp.path()).cleanup_old_backups(0).unwrap();
        assert_eq!(summary.removed, vec!["yesterday".to_string()]);
    }
}
