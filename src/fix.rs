//! Fix application state machine
//!
//! Tracks one suggestion through: approval -> backup -> apply -> verify,
//! with an automatic rollback when any step fails.

use crate::apply::MutationApplier;
use crate::approval::{ApprovalGate, DecisionKind, TerminalApproval};
use crate::backup::{BackupCatalog, BackupInfo, BackupSet, BackupStore, CleanupSummary};
use crate::config::Config;
use crate::error::Result;
use crate::project::ProjectRoot;
use crate::rollback::{RollbackByIdResult, RollbackEngine, RollbackReport};
use crate::suggest::FixSuggestion;
use crate::verify::{VerificationPipeline, VerificationReport, VerifyLimits};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Where a fix attempt is, or where it ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum FixState {
    /// Waiting on the approval gate
    #[default]
    PendingApproval,
    Rejected,
    Skipped,
    Quit,

    Approved,
    BackingUp,
    /// Snapshot failed; nothing was mutated
    BackupFailed,
    Applying,
    RollingBack,
    FailedWithRollback,
    Verifying,
    /// The worker running the fix stopped before reporting. A backup and
    /// some applied steps may exist.
    Interrupted,

    Done {
        verification_passed: bool,
    },
}

impl FixState {
    /// Human-readable status for display
    pub fn status_text(&self) -> &'static str {
        match self {
            FixState::PendingApproval => "Awaiting approval",
            FixState::Rejected => "Rejected",
            FixState::Skipped => "Skipped",
            FixState::Quit => "Quit",
            FixState::Approved => "Approved",
            FixState::BackingUp => "Backing up...",
            FixState::BackupFailed => "Backup failed",
            FixState::Applying => "Applying...",
            FixState::RollingBack => "Rolling back...",
            FixState::FailedWithRollback => "Failed (rolled back)",
            FixState::Verifying => "Verifying...",
            FixState::Interrupted => "Interrupted",
            FixState::Done {
                verification_passed: true,
            } => "Applied",
            FixState::Done {
                verification_passed: false,
            } => "Applied (verification failed)",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FixState::Rejected
                | FixState::Skipped
                | FixState::Quit
                | FixState::BackupFailed
                | FixState::FailedWithRollback
                | FixState::Interrupted
                | FixState::Done { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixResult {
    /// Every step was applied. Verification does not change this.
    pub success: bool,
    pub applied_steps: usize,
    pub backup_set: Option<BackupSet>,
    pub verification_report: Option<VerificationReport>,
    pub error_message: Option<String>,
    /// A backup exists that can undo this attempt
    pub rollback_available: bool,
    pub verification_passed: Option<bool>,
    pub state: FixState,
    /// Set when a failed apply triggered an automatic rollback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_report: Option<RollbackReport>,
}

impl FixResult {
    fn stopped(state: FixState, error_message: Option<String>) -> Self {
        Self {
            success: false,
            applied_steps: 0,
            backup_set: None,
            verification_report: None,
            error_message,
            rollback_available: false,
            verification_passed: None,
            state,
            rollback_report: None,
        }
    }
}

pub struct Orchestrator {
    store: BackupStore,
    applier: MutationApplier,
    rollback: RollbackEngine,
    verifier: VerificationPipeline,
    catalog: BackupCatalog,
    gate: Box<dyn ApprovalGate>,
}

impl Orchestrator {
    /// Wire every component for `project` using `config`. The approval gate
    /// defaults to the terminal prompt.
    pub fn new(project: ProjectRoot, config: &Config) -> Self {
        let retry = config.retry_policy();
        let store = BackupStore::new(project.clone(), &config.cache_dir(&project)).with_retry(retry);
        Self {
            applier: MutationApplier::new(project.clone()).with_retry(retry),
            rollback: RollbackEngine::new(store.clone()),
            verifier: VerificationPipeline::new(project).with_limits(VerifyLimits::from(config)),
            catalog: BackupCatalog::new(store.store_dir()),
            store,
            gate: Box::new(TerminalApproval),
        }
    }

    pub fn with_gate(mut self, gate: impl ApprovalGate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Approve, back up, apply every step in order, then verify.
    ///
    /// The first failing step rolls the whole attempt back before returning.
    /// `auto_approve` skips the gate.
    pub fn apply_fix(&self, suggestion: &FixSuggestion, auto_approve: bool) -> FixResult {
        self.run_fix(suggestion, auto_approve, None)
    }

    /// `apply_fix`, publishing the backup set to `created` as soon as it
    /// exists so a caller can still find it if this thread dies.
    fn run_fix(
        &self,
        suggestion: &FixSuggestion,
        auto_approve: bool,
        created: Option<&OnceLock<BackupSet>>,
    ) -> FixResult {
        let mut state = FixState::PendingApproval;
        tracing::debug!(title = %suggestion.title, steps = suggestion.steps.len(), "fix started");

        if !auto_approve {
            let decision = self.gate.request_approval(suggestion);
            let next = match decision.kind {
                DecisionKind::Approved => None,
                DecisionKind::Rejected => Some(FixState::Rejected),
                DecisionKind::Skipped => Some(FixState::Skipped),
                DecisionKind::Quit => Some(FixState::Quit),
            };
            if let Some(next) = next {
                transition(&mut state, next);
                tracing::info!(title = %suggestion.title, state = next.status_text(), "fix not applied");
                let reason = decision
                    .reason
                    .unwrap_or_else(|| format!("Fix {}", next.status_text().to_lowercase()));
                return FixResult::stopped(next, Some(reason));
            }
        }
        transition(&mut state, FixState::Approved);

        transition(&mut state, FixState::BackingUp);
        let backup_set = match self.store.create_backup(suggestion) {
            Ok(set) => set,
            Err(err) => {
                transition(&mut state, FixState::BackupFailed);
                tracing::warn!(title = %suggestion.title, error = %err, "fix aborted before any change");
                return FixResult::stopped(state, Some(format!("Backup failed: {}", err)));
            }
        };

        if let (Some(slot), Some(set)) = (created, backup_set.as_ref()) {
            let _ = slot.set(set.clone());
        }

        transition(&mut state, FixState::Applying);
        let mut applied_steps = 0;
        for change in &suggestion.steps {
            if let Err(err) = self.applier.apply(&change.step) {
                if err.is_policy_rejection() {
                    tracing::warn!(
                        title = %suggestion.title,
                        step = applied_steps + 1,
                        "step refused by policy; rolling back"
                    );
                } else {
                    tracing::warn!(
                        title = %suggestion.title,
                        step = applied_steps + 1,
                        error = %err,
                        "step failed; rolling back"
                    );
                }
                transition(&mut state, FixState::RollingBack);
                let rollback_report = backup_set.as_ref().map(|set| self.rollback.rollback(set));
                transition(&mut state, FixState::FailedWithRollback);

                let mut message = err.to_string();
                if let Some(report) = rollback_report.as_ref().filter(|r| !r.success) {
                    message.push_str(&format!(
                        " (rollback incomplete: {} of {} files failed to restore)",
                        report.failed,
                        report.failed + report.restored
                    ));
                }

                return FixResult {
                    success: false,
                    applied_steps,
                    rollback_available: backup_set.is_some(),
                    backup_set,
                    verification_report: None,
                    error_message: Some(message),
                    verification_passed: None,
                    state,
                    rollback_report,
                };
            }
            applied_steps += 1;
        }

        transition(&mut state, FixState::Verifying);
        let report = self.verifier.verify(suggestion);
        let verification_passed = report.success;
        if !verification_passed {
            tracing::warn!(
                title = %suggestion.title,
                failed = report.checks_failed.len(),
                "fix applied but verification failed"
            );
        }
        transition(&mut state, FixState::Done { verification_passed });
        tracing::info!(title = %suggestion.title, applied_steps, "fix applied");

        FixResult {
            success: true,
            applied_steps,
            rollback_available: backup_set.is_some(),
            backup_set,
            verification_report: Some(report),
            error_message: None,
            verification_passed: Some(verification_passed),
            state,
            rollback_report: None,
        }
    }

    /// Run `apply_fix` on the blocking pool so filesystem work never stalls
    /// the async runtime.
    ///
    /// If the worker dies the result is `Interrupted`, carrying the backup set
    /// when one had already been written.
    pub async fn apply_fix_blocking_task(
        self: Arc<Self>,
        suggestion: FixSuggestion,
        auto_approve: bool,
    ) -> FixResult {
        let created = Arc::new(OnceLock::new());
        let slot = Arc::clone(&created);
        let task = tokio::task::spawn_blocking(move || {
            self.run_fix(&suggestion, auto_approve, Some(&*slot))
        });
        match task.await {
            Ok(result) => result,
            Err(err) => {
                let backup_set = created.get().cloned();
                tracing::warn!(
                    error = %err,
                    backup_id = backup_set.as_ref().map(|s| s.backup_id.as_str()),
                    "fix task did not complete"
                );
                let mut message = format!("Fix task did not complete: {}", err);
                if let Some(set) = &backup_set {
                    message.push_str(&format!(
                        "; files may be partly changed, restore with backup {}",
                        set.backup_id
                    ));
                }
                FixResult {
                    rollback_available: backup_set.is_some(),
                    backup_set,
                    ..FixResult::stopped(FixState::Interrupted, Some(message))
                }
            }
        }
    }

    pub fn rollback(&self, set: &BackupSet) -> RollbackReport {
        self.rollback.rollback(set)
    }

    pub fn rollback_by_id(&self, backup_id: &str) -> RollbackByIdResult {
        self.rollback.rollback_by_id(backup_id)
    }

    pub fn verify(&self, suggestion: &FixSuggestion) -> VerificationReport {
        self.verifier.verify(suggestion)
    }

    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        self.catalog.list_backups()
    }

    pub fn cleanup_old_backups(&self, keep_days: u64) -> Result<CleanupSummary> {
        self.catalog.cleanup_old_backups(keep_days)
    }
}

fn transition(state: &mut FixState, next: FixState) {
    tracing::debug!(from = state.status_text(), to = next.status_text(), "fix state");
    *state = next;
}
