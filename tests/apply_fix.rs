use cosmos_safe_apply::approval::{ApprovalDecision, FixedDecision};
use cosmos_safe_apply::backup::BackupEntry;
use cosmos_safe_apply::config::Config;
use cosmos_safe_apply::suggest::{MutationAction, MutationStep};
use cosmos_safe_apply::util::hash_bytes;
use cosmos_safe_apply::{FixState, FixSuggestion, Orchestrator, ProjectRoot};
use std::fs;
use std::path::{Path, PathBuf};

fn orchestrator(root: &Path, decision: ApprovalDecision) -> Orchestrator {
    Orchestrator::new(ProjectRoot::new(root), &Config::default()).with_gate(FixedDecision(decision))
}

fn replace(path: &str, content: &str) -> MutationStep {
    MutationStep::FileModification {
        file_path: PathBuf::from(path),
        action: MutationAction::Replace,
        old_code: None,
        new_code: content.to_string(),
    }
}

#[test]
fn replace_then_rollback_restores_original() {
    let root = tempfile::tempdir().unwrap();
    let before = "def f():\n    return 1\n";
    let after = "def f():\n    return 2\n";
    fs::write(root.path().join("test.py"), before).unwrap();

    let orch = orchestrator(root.path(), ApprovalDecision::rejected("unused"));
    let suggestion = FixSuggestion::new("Bump return value").with_step(replace("test.py", after));
    let result = orch.apply_fix(&suggestion, true);

    assert!(result.success, "{:?}", result.error_message);
    assert!(result.rollback_available);
    assert_eq!(result.verification_passed, Some(true));
    assert_eq!(result.state, FixState::Done { verification_passed: true });
    assert_eq!(fs::read_to_string(root.path().join("test.py")).unwrap(), after);

    let set = result.backup_set.expect("backup set");
    match &set.entries[..] {
        [BackupEntry::Existing { checksum, .. }] => {
            assert_eq!(checksum, &hash_bytes(before.as_bytes()))
        }
        other => panic!("unexpected entries {:?}", other),
    }

    let report = orch.rollback(&set);
    assert!(report.success);
    assert_eq!(fs::read_to_string(root.path().join("test.py")).unwrap(), before);
}

#[test]
fn second_write_failure_rolls_back_first_file() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("first.txt"), "original").unwrap();
    // `blocker` is a regular file, so `blocker/child.txt` cannot be written.
    fs::write(root.path().join("blocker"), "not a directory").unwrap();

    let suggestion = FixSuggestion::new("Two files")
        .with_step(replace("first.txt", "changed"))
        .with_step(replace("blocker/child.txt", "never written"));
    let result = orchestrator(root.path(), ApprovalDecision::approved()).apply_fix(&suggestion, true);

    assert!(!result.success);
    assert_eq!(result.applied_steps, 1);
    assert!(result.rollback_available);
    assert_eq!(result.state, FixState::FailedWithRollback);
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .contains("blocker/child.txt"));
    assert!(result.verification_report.is_none());
    assert_eq!(
        fs::read_to_string(root.path().join("first.txt")).unwrap(),
        "original"
    );
}

#[test]
fn invalid_python_fails_verification_but_not_apply() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("module.py"), "x = 1\n").unwrap();

    let suggestion =
        FixSuggestion::new("Break it").with_step(replace("module.py", "def broken(:\n    pass\n"));
    let result = orchestrator(root.path(), ApprovalDecision::approved()).apply_fix(&suggestion, true);

    assert!(result.success);
    assert_eq!(result.verification_passed, Some(false));
    let report = result.verification_report.unwrap();
    assert!(!report.success);
    assert!(report
        .checks_failed
        .iter()
        .any(|c| c.starts_with("module.py: SyntaxError")));
}

#[test]
fn declined_gates_never_mutate() {
    let cases = [
        (ApprovalDecision::rejected("not today"), FixState::Rejected),
        (ApprovalDecision::skipped(), FixState::Skipped),
        (ApprovalDecision::quit(), FixState::Quit),
    ];
    for (decision, expected) in cases {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.txt"), "untouched").unwrap();
        let orch = orchestrator(root.path(), decision);

        let result = orch.apply_fix(&FixSuggestion::new("gated").with_step(replace("a.txt", "x")), false);
        assert!(!result.success);
        assert_eq!(result.state, expected);
        assert!(result.backup_set.is_none());
        assert!(!result.rollback_available);
        assert_eq!(fs::read_to_string(root.path().join("a.txt")).unwrap(), "untouched");
        assert!(orch.list_backups().unwrap().is_empty());
    }
}

#[test]
fn rollback_by_id_after_successful_fix() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("ci")).unwrap();
    fs::write(root.path().join("ci/config.yml"), "steps: []\n").unwrap();

    let orch = orchestrator(root.path(), ApprovalDecision::approved());
    let suggestion = FixSuggestion::new("Add step")
        .with_step(replace("ci/config.yml", "steps:\n  - run: pytest\n"));
    let result = orch.apply_fix(&suggestion, true);
    assert!(result.success);
    let backup_id = result.backup_set.unwrap().backup_id;

    let restored = orch.rollback_by_id(&backup_id);
    assert!(restored.success, "{:?}", restored);
    assert_eq!(restored.restored_files, vec![PathBuf::from("ci/config.yml")]);
    assert_eq!(
        fs::read_to_string(root.path().join("ci/config.yml")).unwrap(),
        "steps: []\n"
    );
}

#[test]
fn suggestion_json_wire_format() {
    let json = r#"{
        "title": "Fix import",
        "confidence": 0.9,
        "risk_level": "low",
        "steps": [
            {"type": "file_modification", "file_path": "app.py", "action": "append", "new_code": "import os\n"},
            {"type": "config_change", "file_path": "setup.cfg", "new_code": "[tool]\n"},
            {"type": "command", "command": "pip install -e ."}
        ]
    }"#;
    let suggestion: FixSuggestion = serde_json::from_str(json).unwrap();
    assert_eq!(suggestion.steps.len(), 3);
    assert_eq!(
        suggestion.target_files(),
        vec![PathBuf::from("app.py"), PathBuf::from("setup.cfg")]
    );
}

#[test]
fn failed_fix_restores_file_above_the_root() {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().join("repo");
    fs::create_dir_all(&root).unwrap();
    fs::write(parent.path().join("shared.cfg"), "level = 1\n").unwrap();
    fs::write(root.join("blocker"), "not a directory").unwrap();

    let suggestion = FixSuggestion::new("Touch shared config")
        .with_step(replace("../shared.cfg", "level = 2\n"))
        .with_step(replace("blocker/child.txt", "never written"));
    let result = orchestrator(&root, ApprovalDecision::approved()).apply_fix(&suggestion, true);

    assert!(!result.success);
    assert_eq!(result.state, FixState::FailedWithRollback);
    assert_eq!(
        fs::read_to_string(parent.path().join("shared.cfg")).unwrap(),
        "level = 1\n"
    );
    assert!(!root.join("shared.cfg").exists());
}

#[test]
fn python2_print_fails_verification() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("hello.py"), "print(\"hi\")\n").unwrap();

    let suggestion =
        FixSuggestion::new("Regress").with_step(replace("hello.py", "print \"hi\"\n"));
    let result = orchestrator(root.path(), ApprovalDecision::approved()).apply_fix(&suggestion, true);

    assert!(result.success);
    assert_eq!(result.verification_passed, Some(false));
    let report = result.verification_report.unwrap();
    assert!(report
        .checks_failed
        .iter()
        .any(|c| c.contains("Missing parentheses in call to 'print'")));
}
