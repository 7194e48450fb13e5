//! Approval gates
//!
//! A fix only touches the working tree after a gate says yes. The gate is a
//! trait so the CLI can prompt on the terminal while tests and scripted runs
//! approve (or refuse) without any IO.

use crate::suggest::FixSuggestion;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approved,
    Rejected,
    /// Not now; move on to the next suggestion
    Skipped,
    /// Stop processing suggestions altogether
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub kind: DecisionKind,
    pub reason: Option<String>,
}

impl ApprovalDecision {
    pub fn approved() -> Self {
        Self {
            kind: DecisionKind::Approved,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::Rejected,
            reason: Some(reason.into()),
        }
    }

    pub fn skipped() -> Self {
        Self {
            kind: DecisionKind::Skipped,
            reason: None,
        }
    }

    pub fn quit() -> Self {
        Self {
            kind: DecisionKind::Quit,
            reason: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.kind == DecisionKind::Approved
    }
}

pub trait ApprovalGate: Send + Sync {
    fn request_approval(&self, suggestion: &FixSuggestion) -> ApprovalDecision;
}

/// Approves everything. Used for `--yes` and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ApprovalGate for AutoApprove {
    fn request_approval(&self, _suggestion: &FixSuggestion) -> ApprovalDecision {
        ApprovalDecision::approved()
    }
}

/// Always answers with the same decision
#[derive(Debug, Clone)]
pub struct FixedDecision(pub ApprovalDecision);

impl ApprovalGate for FixedDecision {
    fn request_approval(&self, _suggestion: &FixSuggestion) -> ApprovalDecision {
        self.0.clone()
    }
}

/// Interactive y/n/s/q prompt on stdin/stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalApproval;

impl ApprovalGate for TerminalApproval {
    fn request_approval(&self, suggestion: &FixSuggestion) -> ApprovalDecision {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        match prompt_decision(suggestion, &mut input, &mut output) {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(error = %err, "approval prompt failed");
                ApprovalDecision::rejected(format!("approval prompt failed: {}", err))
            }
        }
    }
}

/// Show a summary of `suggestion` and read answers until one is recognised.
/// End of input counts as quitting.
pub fn prompt_decision<R: BufRead, W: Write>(
    suggestion: &FixSuggestion,
    input: &mut R,
    output: &mut W,
) -> io::Result<ApprovalDecision> {
    writeln!(output)?;
    writeln!(output, "  {}", suggestion.title)?;
    if !suggestion.description.is_empty() {
        writeln!(output, "  {}", suggestion.description)?;
    }
    writeln!(
        output,
        "  confidence {:.0}%  risk {}",
        suggestion.confidence * 100.0,
        suggestion.risk_level.label()
    )?;
    for change in &suggestion.steps {
        let target = change
            .step
            .target_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(no file)".to_string());
        writeln!(output, "    - {:<8} {}", change.step.kind_label(), target)?;
    }
    writeln!(output)?;

    loop {
        write!(output, "  Apply this fix? [y]es / [n]o / [s]kip / [q]uit: ")?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(ApprovalDecision::quit());
        }

        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(ApprovalDecision::approved()),
            "n" | "no" => return Ok(ApprovalDecision::rejected("declined at prompt")),
            "s" | "skip" => return Ok(ApprovalDecision::skipped()),
            "q" | "quit" => return Ok(ApprovalDecision::quit()),
            _ => {
                writeln!(output, "  Please enter y, n, s, or q.")?;
                continue;
            }
        }
    }
}
