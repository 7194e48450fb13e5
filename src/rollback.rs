//! Restores backups to the working tree
//!
//! Rollback is best-effort per file: one unrecoverable entry never stops the
//! others, and every outcome is counted. Nothing in this module returns an
//! error to the caller; failures are data in the reports.

use crate::backup::{is_renamed_copy, BackupEntry, BackupSet, BackupStore};
use crate::util::{ensure_parent_dir, hash_file};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of restoring an in-memory `BackupSet`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub backup_id: String,
    /// True only when every entry was restored
    pub success: bool,
    pub restored: usize,
    pub failed: usize,
    pub restored_files: Vec<PathBuf>,
    pub failures: Vec<FailedFile>,
    /// Restored files whose content no longer hashes to the recorded checksum.
    /// Reported, but not counted as failures.
    pub checksum_mismatches: Vec<PathBuf>,
}

/// Outcome of restoring a backup found only by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackByIdResult {
    pub backup_id: String,
    pub success: bool,
    pub restored_files: Vec<PathBuf>,
    pub failed_files: Vec<FailedFile>,
    /// Set when nothing could be attempted (unknown or invalid id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RollbackEngine {
    store: BackupStore,
}

impl RollbackEngine {
    pub fn new(store: BackupStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Restore every entry of `set`.
    pub fn rollback(&self, set: &BackupSet) -> RollbackReport {
        let mut report = RollbackReport {
            backup_id: set.backup_id.clone(),
            ..RollbackReport::default()
        };

        for entry in &set.entries {
            let original = entry.original_path();
            let target = self.store.project().absolute(original);
            match self.restore_entry(entry, &target) {
                Ok(mismatch) => {
                    if mismatch {
                        tracing::warn!(
                            path = %original.display(),
                            backup_id = %set.backup_id,
                            "restored file does not match recorded checksum"
                        );
                        report.checksum_mismatches.push(original.to_path_buf());
                    }
                    report.restored += 1;
                    report.restored_files.push(original.to_path_buf());
                }
                Err(error) => {
                    tracing::warn!(path = %original.display(), error = %error, "failed to restore file");
                    report.failed += 1;
                    report.failures.push(FailedFile {
                        path: original.to_path_buf(),
                        error,
                    });
                }
            }
        }

        report.success = report.failed == 0;
        if report.success {
            tracing::info!(backup_id = %set.backup_id, restored = report.restored, "rollback complete");
        } else {
            tracing::warn!(
                backup_id = %set.backup_id,
                restored = report.restored,
                failed = report.failed,
                "rollback incomplete"
            );
        }
        report
    }

    /// Roll back, then delete the backup directory if every file came back.
    /// A partial rollback keeps the backup so it can be retried.
    pub fn rollback_and_discard(&self, set: &BackupSet) -> RollbackReport {
        let report = self.rollback(set);
        if report.success {
            if let Err(err) = self.store.remove(&set.backup_id) {
                tracing::warn!(backup_id = %set.backup_id, error = %err, "failed to discard backup");
            }
        }
        report
    }

    /// Restore whatever the on-disk backup `backup_id` contains, each file to
    /// its path relative to the project root.
    ///
    /// Files that did not exist before the fix left nothing in the backup
    /// directory, so they are not removed here. Files from outside the root
    /// were stored under their base name and come back inside the root; the
    /// renamed `name~N` copies are reported as failures rather than written.
    pub fn rollback_by_id(&self, backup_id: &str) -> RollbackByIdResult {
        let mut result = RollbackByIdResult {
            backup_id: backup_id.to_string(),
            ..RollbackByIdResult::default()
        };

        let backup_dir = match self.store.backup_dir(backup_id) {
            Ok(dir) => dir,
            Err(err) => {
                result.error = Some(err.to_string());
                return result;
            }
        };
        if !backup_dir.is_dir() {
            result.error = Some(format!(
                "Backup '{}' not found in {}",
                backup_id,
                self.store.store_dir().display()
            ));
            return result;
        }

        for entry in WalkDir::new(&backup_dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .and_then(|p| p.strip_prefix(&backup_dir).ok())
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    result.failed_files.push(FailedFile {
                        path,
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&backup_dir) else {
                continue;
            };
            let relative = relative.to_path_buf();
            if is_renamed_copy(&relative) {
                tracing::warn!(path = %relative.display(), "skipping renamed backup copy");
                result.failed_files.push(FailedFile {
                    path: relative,
                    error: "ambiguous original location; restore from the backup set instead"
                        .to_string(),
                });
                continue;
            }
            let target = self.store.project().path().join(&relative);
            match self.copy_back(entry.path(), &target) {
                Ok(()) => result.restored_files.push(relative),
                Err(err) => {
                    tracing::warn!(path = %relative.display(), error = %err, "failed to restore file");
                    result.failed_files.push(FailedFile {
                        path: relative,
                        error: err.to_string(),
                    });
                }
            }
        }

        result.success = result.failed_files.is_empty();
        tracing::info!(
            backup_id,
            restored = result.restored_files.len(),
            failed = result.failed_files.len(),
            "rollback by id finished"
        );
        result
    }

    /// Returns whether the restored bytes drifted from the recorded checksum.
    fn restore_entry(&self, entry: &BackupEntry, target: &Path) -> Result<bool, String> {
        match entry {
            BackupEntry::Absent { .. } => {
                // Unreachable paths (e.g. a parent that is a regular file) were
                // never created either.
                if fs::symlink_metadata(target).is_err() {
                    return Ok(false);
                }
                match fs::remove_file(target) {
                    Ok(()) => Ok(false),
                    Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
                    Err(err) => Err(format!("Failed to remove {}: {}", target.display(), err)),
                }
            }
            BackupEntry::Existing {
                backup_path,
                checksum,
                ..
            } => {
                if !backup_path.is_file() {
                    return Err(format!(
                        "Backup file missing: {}",
                        backup_path.display()
                    ));
                }
                self.copy_back(backup_path, target)
                    .map_err(|e| format!("Failed to restore {}: {}", target.display(), e))?;

                if checksum.is_empty() {
                    return Ok(false);
                }
                match hash_file(target) {
                    Ok(actual) => Ok(actual != *checksum),
                    Err(err) => {
                        tracing::warn!(path = %target.display(), error = %err, "could not re-hash restored file");
                        Ok(true)
                    }
                }
            }
        }
    }

    fn copy_back(&self, backup: &Path, target: &Path) -> std::io::Result<()> {
        let retry = self.store.retry();
        let bytes = retry.run(|| fs::read(backup))?;
        ensure_parent_dir(target)?;
        retry.run(|| fs::write(target, &bytes))
    }
}
