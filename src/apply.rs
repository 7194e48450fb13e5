//! Applies a single mutation step to the working tree
//!
//! No backup is taken here and there is no dry run; the orchestrator snapshots
//! files before calling `apply`. Command steps are refused unconditionally.

use crate::error::{FixError, Result};
use crate::project::ProjectRoot;
use crate::suggest::{MutationAction, MutationStep};
use crate::util::{ensure_parent_dir, RetryPolicy};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct MutationApplier {
    project: ProjectRoot,
    retry: RetryPolicy,
}

impl MutationApplier {
    pub fn new(project: ProjectRoot) -> Self {
        Self {
            project,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Apply `step`, returning the absolute path that was written.
    pub fn apply(&self, step: &MutationStep) -> Result<PathBuf> {
        let (file_path, action, content) = match step {
            MutationStep::FileModification {
                file_path,
                action,
                new_code,
                ..
            } => (file_path, *action, new_code),
            MutationStep::ConfigChange {
                file_path,
                new_code,
                ..
            } => (file_path, MutationAction::Replace, new_code),
            MutationStep::Command { command } => {
                tracing::warn!(command = %command, "refusing to execute command step");
                return Err(FixError::CommandExecutionDisabled {
                    command: command.clone(),
                });
            }
        };

        let absolute = self.project.absolute(file_path);
        self.write(&absolute, action, content)
            .map_err(|source| FixError::Mutation {
                path: file_path.clone(),
                source,
            })?;
        tracing::debug!(path = %file_path.display(), action = action.label(), "applied step");
        Ok(absolute)
    }

    fn write(&self, path: &Path, action: MutationAction, content: &str) -> std::io::Result<()> {
        ensure_parent_dir(path)?;
        match action {
            MutationAction::Create | MutationAction::Replace => {
                self.retry.run(|| fs::write(path, content))
            }
            MutationAction::Append => {
                let mut current = match self.retry.run(|| fs::read(path)) {
                    Ok(bytes) => bytes,
                    Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
                    Err(err) => return Err(err),
                };
                current.extend_from_slice(content.as_bytes());
                self.retry.run(|| fs::write(path, &current))
            }
        }
    }
}
