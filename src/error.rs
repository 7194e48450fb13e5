//! Error taxonomy for fix application
//!
//! Only the failures that stop an operation live here. Verification problems
//! are reported through `VerificationReport`, and rollback problems are always
//! per-file entries in the rollback reports.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, FixError>;

#[derive(Debug, thiserror::Error)]
pub enum FixError {
    /// Snapshotting an existing file failed. Nothing has been mutated yet.
    #[error("failed to back up {}: {source}", path.display())]
    BackupCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a mutation step failed. The caller is expected to roll back.
    #[error("failed to apply change to {}: {source}", path.display())]
    Mutation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Command steps are never executed.
    #[error("command execution is disabled: refusing to run `{command}`")]
    CommandExecutionDisabled { command: String },

    #[error("invalid backup id: {0}")]
    InvalidBackupId(String),

    /// IO failure inside the backup store itself (listing, cleanup, removal).
    #[error("backup store error at {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FixError {
    /// File the error is about, when there is one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            FixError::BackupCreation { path, .. }
            | FixError::Mutation { path, .. }
            | FixError::Store { path, .. } => Some(path),
            FixError::CommandExecutionDisabled { .. } | FixError::InvalidBackupId(_) => None,
        }
    }

    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, FixError::CommandExecutionDisabled { .. })
    }
}
