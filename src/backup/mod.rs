//! Pre-mutation backups
//!
//! Before a suggestion touches the working tree, every file it targets is
//! copied into `<cache_dir>/auto_fix_backups/<backup_id>/`. Project files keep
//! their relative layout; absolute paths are stored under their base name.
//! There is no index file: the directory tree is the catalog.
//!
//! A backup is all-or-nothing. If any existing file cannot be copied, the
//! partially written directory is removed and no `BackupSet` is returned.

pub mod catalog;

use crate::error::{FixError, Result};
use crate::project::ProjectRoot;
use crate::suggest::FixSuggestion;
use crate::util::{ensure_parent_dir, hash_bytes, hash_str, RetryPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use catalog::{BackupCatalog, BackupInfo, CleanupSummary};

pub const BACKUP_DIR_NAME: &str = "auto_fix_backups";

const BACKUP_ID_HASH_LEN: usize = 8;

/// One file's state captured before a fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BackupEntry {
    /// The file existed; its bytes were copied to `backup_path`
    Existing {
        original_path: PathBuf,
        backup_path: PathBuf,
        /// SHA-256 of the pre-mutation bytes
        checksum: String,
    },
    /// The file did not exist. Restoring means deleting it.
    Absent { original_path: PathBuf },
}

impl BackupEntry {
    pub fn original_path(&self) -> &Path {
        match self {
            BackupEntry::Existing { original_path, .. } | BackupEntry::Absent { original_path } => {
                original_path
            }
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, BackupEntry::Absent { .. })
    }
}

/// Everything captured for one fix attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSet {
    pub backup_id: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<BackupEntry>,
    pub description: String,
}

impl BackupSet {
    pub fn existing_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_absent()).count()
    }

    pub fn absent_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_absent()).count()
    }
}

/// `<timestamp>_<hash of title>`; sortable and readable in a directory listing.
pub fn generate_backup_id(title: &str, now: DateTime<Utc>) -> String {
    let digest = hash_str(title);
    format!(
        "{}_{}",
        now.format("%Y%m%d_%H%M%S_%3f"),
        &digest[..BACKUP_ID_HASH_LEN]
    )
}

/// Backup ids name a single directory under the store.
pub fn validate_backup_id(id: &str) -> Result<()> {
    let trimmed = id.trim();
    if trimmed.is_empty()
        || trimmed != id
        || id == "."
        || id.contains("..")
        || id.contains('/')
        || id.contains('\\')
    {
        return Err(FixError::InvalidBackupId(id.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    project: ProjectRoot,
    store_dir: PathBuf,
    retry: RetryPolicy,
}

impl BackupStore {
    /// Backups for `project` live under `<cache_dir>/auto_fix_backups`.
    pub fn new(project: ProjectRoot, cache_dir: &Path) -> Self {
        Self {
            project,
            store_dir: cache_dir.join(BACKUP_DIR_NAME),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn project(&self) -> &ProjectRoot {
        &self.project
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn backup_dir(&self, backup_id: &str) -> Result<PathBuf> {
        validate_backup_id(backup_id)?;
        Ok(self.store_dir.join(backup_id))
    }

    /// Snapshot every file `suggestion` targets. Returns `None` when the
    /// suggestion touches no files.
    pub fn create_backup(&self, suggestion: &FixSuggestion) -> Result<Option<BackupSet>> {
        let targets = suggestion.target_files();
        if targets.is_empty() {
            tracing::debug!(title = %suggestion.title, "suggestion touches no files; no backup");
            return Ok(None);
        }

        let created_at = Utc::now();
        let (backup_id, backup_dir) = self.allocate_dir(&suggestion.title, created_at)?;

        match self.capture(&targets, &backup_dir) {
            Ok(entries) => {
                let set = BackupSet {
                    backup_id,
                    created_at,
                    entries,
                    description: suggestion.title.clone(),
                };
                tracing::info!(
                    backup_id = %set.backup_id,
                    existing = set.existing_count(),
                    absent = set.absent_count(),
                    "backup created"
                );
                Ok(Some(set))
            }
            Err(err) => {
                if let Err(cleanup_err) = fs::remove_dir_all(&backup_dir) {
                    tracing::warn!(
                        dir = %backup_dir.display(),
                        error = %cleanup_err,
                        "failed to remove partial backup"
                    );
                }
                tracing::warn!(error = %err, "backup aborted");
                Err(err)
            }
        }
    }

    /// Delete one backup directory. Returns false if it was already gone.
    pub fn remove(&self, backup_id: &str) -> Result<bool> {
        let dir = self.backup_dir(backup_id)?;
        if !dir.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|source| FixError::Store {
            path: dir.clone(),
            source,
        })?;
        tracing::info!(backup_id, "backup removed");
        Ok(true)
    }

    /// Claim a fresh directory for this backup. `create_dir` is the claim, so
    /// two writers racing on the same id never share a directory.
    fn allocate_dir(&self, title: &str, now: DateTime<Utc>) -> Result<(String, PathBuf)> {
        fs::create_dir_all(&self.store_dir).map_err(|source| FixError::BackupCreation {
            path: self.store_dir.clone(),
            source,
        })?;

        let base_id = generate_backup_id(title, now);
        let mut backup_id = base_id.clone();
        let mut counter = 1;
        loop {
            let dir = self.store_dir.join(&backup_id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((backup_id, dir)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    backup_id = format!("{}-{}", base_id, counter);
                    counter += 1;
                }
                Err(source) => return Err(FixError::BackupCreation { path: dir, source }),
            }
        }
    }

    fn capture(&self, targets: &[PathBuf], backup_dir: &Path) -> Result<Vec<BackupEntry>> {
        let resolved: Vec<_> = targets.iter().map(|t| self.project.resolve(t)).collect();

        // Project files keep their exact relative path. Files from outside the
        // root only get a base name, renamed `name~N` if that is already taken.
        let mut used = HashSet::new();
        let mut layout = vec![None; resolved.len()];
        for outside in [false, true] {
            for (slot, path) in layout.iter_mut().zip(&resolved) {
                if path.outside_root == outside && path.absolute.exists() {
                    *slot = Some(unique_relative(&path.backup_relative, &mut used));
                }
            }
        }

        let mut entries = Vec::with_capacity(targets.len());
        for (resolved, relative) in resolved.into_iter().zip(layout) {
            let Some(relative) = relative else {
                tracing::debug!(path = %resolved.original.display(), "target does not exist yet");
                entries.push(BackupEntry::Absent {
                    original_path: resolved.original,
                });
                continue;
            };

            let backup_path = backup_dir.join(&relative);
            let checksum = self
                .copy_verbatim(&resolved.absolute, &backup_path)
                .map_err(|source| FixError::BackupCreation {
                    path: resolved.original.clone(),
                    source,
                })?;

            entries.push(BackupEntry::Existing {
                original_path: resolved.original,
                backup_path,
                checksum,
            });
        }

        Ok(entries)
    }

    fn copy_verbatim(&self, source: &Path, dest: &Path) -> std::io::Result<String> {
        let bytes = self.retry.run(|| fs::read(source))?;
        ensure_parent_dir(dest)?;
        self.retry.run(|| fs::write(dest, &bytes))?;
        Ok(hash_bytes(&bytes))
    }
}

/// Whether a top-level backup file carries the `~N` suffix that
/// `unique_relative` adds. Its original location cannot be recovered from
/// the backup directory alone.
pub fn is_renamed_copy(relative: &Path) -> bool {
    if relative.components().count() != 1 {
        return false;
    }
    let Some(name) = relative.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    match name.rsplit_once('~') {
        Some((stem, suffix)) => {
            !stem.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Two files from outside the root can share a base name; keep both copies.
fn unique_relative(relative: &Path, used: &mut HashSet<PathBuf>) -> PathBuf {
    if used.insert(relative.to_path_buf()) {
        return relative.to_path_buf();
    }
    let name = relative
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut counter = 1;
    loop {
        let candidate = relative.with_file_name(format!("{}~{}", name, counter));
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
