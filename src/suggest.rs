//! Fix suggestions consumed by the safe-apply pipeline
//!
//! Suggestions are produced elsewhere (pattern matching or an LLM) and arrive
//! here as JSON. Each step is a closed `MutationStep` so every consumer has to
//! handle every kind.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// How a file modification changes its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    /// Write the content, creating the file (and parents) or overwriting it
    Create,
    /// Add the content to the end of the file
    Append,
    /// Overwrite the whole file with the content
    Replace,
}

impl MutationAction {
    pub fn label(&self) -> &'static str {
        match self {
            MutationAction::Create => "create",
            MutationAction::Append => "append",
            MutationAction::Replace => "replace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationStep {
    FileModification {
        file_path: PathBuf,
        action: MutationAction,
        /// What the suggestion expects to be replaced (informational only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_code: Option<String>,
        new_code: String,
    },
    /// Never executed. Kept in the model so suggestions containing commands
    /// still parse and can be rejected explicitly.
    Command { command: String },
    /// Applied exactly like a `Replace` file modification
    ConfigChange {
        file_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_code: Option<String>,
        new_code: String,
    },
}

impl MutationStep {
    /// File this step writes, if any
    pub fn target_path(&self) -> Option<&Path> {
        match self {
            MutationStep::FileModification { file_path, .. }
            | MutationStep::ConfigChange { file_path, .. } => Some(file_path),
            MutationStep::Command { .. } => None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            MutationStep::FileModification { action, .. } => action.label(),
            MutationStep::Command { .. } => "command",
            MutationStep::ConfigChange { .. } => "config change",
        }
    }
}

/// One authored step of a suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChange {
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub step: MutationStep,
}

impl CodeChange {
    pub fn new(step: MutationStep) -> Self {
        Self {
            description: String::new(),
            step,
        }
    }
}

/// Risk level assigned by whoever produced the suggestion
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<CodeChange>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

impl FixSuggestion {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            steps: Vec::new(),
            confidence: 0.0,
            risk_level: RiskLevel::default(),
        }
    }

    pub fn with_step(mut self, step: MutationStep) -> Self {
        self.steps.push(CodeChange::new(step));
        self
    }

    /// Deduplicated target files in first-seen order
    pub fn target_files(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .filter_map(|change| change.step.target_path())
            .filter(|path| seen.insert(path.to_path_buf()))
            .map(Path::to_path_buf)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replace(path: &str, content: &str) -> MutationStep {
        MutationStep::FileModification {
            file_path: PathBuf::from(path),
            action: MutationAction::Replace,
            old_code: None,
            new_code: content.to_string(),
        }
    }

    #[test]
    fn test_target_files_dedup_preserves_order() {
        let suggestion = FixSuggestion::new("multi")
            .with_step(replace("b.py", "1"))
            .with_step(MutationStep::Command {
                command: "make".to_string(),
            })
            .with_step(replace("a.py", "2"))
            .with_step(MutationStep::ConfigChange {
                file_path: PathBuf::from("b.py"),
                old_code: None,
                new_code: "3".to_string(),
            });
        assert_eq!(
            suggestion.target_files(),
            vec![PathBuf::from("b.py"), PathBuf::from("a.py")]
        );
    }

    #[test]
    fn test_command_only_suggestion_targets_nothing() {
        let suggestion = FixSuggestion::new("cmd").with_step(MutationStep::Command {
            command: "pip install requests".to_string(),
        });
        assert!(suggestion.target_files().is_empty());
    }

    #[test]
    fn test_parses_wire_format() {
        let json = r#"{
            "title": "Fix flaky import",
            "description": "Pin the import order",
            "confidence": 0.82,
            "risk_level": "low",
            "steps": [
                {"type": "file_modification", "file_path": "app.py", "action": "append",
                 "new_code": "import os\n", "description": "add import"},
                {"type": "command", "command": "pytest -q"},
                {"type": "config_change", "file_path": "setup.cfg", "new_code": "[flake8]\n"}
            ]
        }"#;
        let suggestion: FixSuggestion = serde_json::from_str(json).unwrap();
        assert_eq!(suggestion.risk_level, RiskLevel::Low);
        assert_eq!(suggestion.steps.len(), 3);
        assert_eq!(suggestion.steps[0].description, "add import");
        assert!(matches!(
            suggestion.steps[0].step,
            MutationStep::FileModification {
                action: MutationAction::Append,
                ..
            }
        ));
        assert!(matches!(suggestion.steps[1].step, MutationStep::Command { .. }));
        assert_eq!(suggestion.steps[2].step.kind_label(), "config change");
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let json = r#"{"title": "x", "steps": [{"type": "shell", "command": "ls"}]}"#;
        assert!(serde_json::from_str::<FixSuggestion>(json).is_err());
    }
}
