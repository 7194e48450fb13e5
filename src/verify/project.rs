//! Project-level integrity checks
//!
//! These look at the repository as a whole rather than at the files a fix
//! touched. Missing conventional files are only warnings; a manifest that is
//! present but broken is a failure.

use super::CheckOutcome;
use git2::Repository;
use std::fs;
use std::path::Path;

const CANONICAL_FILES: &[&str] = &["README.md", ".gitignore"];

struct Manifest {
    file: &'static str,
    kind: ManifestKind,
    /// At least one of these top-level keys must be present
    expected_sections: &'static [&'static str],
}

#[derive(Clone, Copy)]
enum ManifestKind {
    Toml,
    Json,
}

const MANIFESTS: &[Manifest] = &[
    Manifest {
        file: "pyproject.toml",
        kind: ManifestKind::Toml,
        expected_sections: &["project", "tool"],
    },
    Manifest {
        file: "Cargo.toml",
        kind: ManifestKind::Toml,
        expected_sections: &["package", "workspace"],
    },
    Manifest {
        file: "package.json",
        kind: ManifestKind::Json,
        expected_sections: &["name"],
    },
];

pub fn check_project(root: &Path) -> Vec<CheckOutcome> {
    let mut outcomes = Vec::new();

    for name in CANONICAL_FILES {
        if root.join(name).exists() {
            outcomes.push(CheckOutcome::Pass(format!("project file present: {}", name)));
        } else {
            outcomes.push(CheckOutcome::Warn(format!("project file missing: {}", name)));
        }
    }

    match Repository::discover(root) {
        Ok(_) => outcomes.push(CheckOutcome::Pass(
            "version control: git repository found".to_string(),
        )),
        Err(_) => outcomes.push(CheckOutcome::Warn(
            "version control: no git repository found".to_string(),
        )),
    }

    for manifest in MANIFESTS {
        let path = root.join(manifest.file);
        if !path.exists() {
            continue;
        }
        outcomes.push(check_manifest(&path, manifest));
    }

    outcomes
}

fn check_manifest(path: &Path, manifest: &Manifest) -> CheckOutcome {
    let label = format!("manifest {}", manifest.file);
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return CheckOutcome::Fail(format!("{}: unreadable: {}", label, e)),
    };

    let keys: Vec<String> = match manifest.kind {
        ManifestKind::Toml => match toml::from_str::<toml::Table>(&content) {
            Ok(table) => table.keys().cloned().collect(),
            Err(e) => return CheckOutcome::Fail(format!("{}: invalid TOML: {}", label, e.message())),
        },
        ManifestKind::Json => match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            Ok(_) => return CheckOutcome::Fail(format!("{}: top level is not an object", label)),
            Err(e) => return CheckOutcome::Fail(format!("{}: invalid JSON: {}", label, e)),
        },
    };

    if manifest
        .expected_sections
        .iter()
        .any(|section| keys.iter().any(|k| k == section))
    {
        CheckOutcome::Pass(label)
    } else {
        CheckOutcome::Fail(format!(
            "{}: missing expected section ({})",
            label,
            manifest.expected_sections.join(" or ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failures(outcomes: &[CheckOutcome]) -> Vec<&str> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                CheckOutcome::Fail(msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_missing_canonical_files_are_warnings() {
        let root = tempfile::tempdir().unwrap();
        let outcomes = check_project(root.path());
        assert!(failures(&outcomes).is_empty());
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, CheckOutcome::Warn(m) if m.contains("README.md"))));
    }

    #[test]
    fn test_git_repository_detected() {
        let root = tempfile::tempdir().unwrap();
        Repository::init(root.path()).unwrap();
        let outcomes = check_project(root.path());
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, CheckOutcome::Pass(m) if m.starts_with("version control"))));
    }

    #[test]
    fn test_valid_pyproject_passes() {
        let root = tempfile::tempdir().unwrap();
        fs::write(
            root.path().join("pyproject.toml"),
            "[project]\nname = \"demo\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        let outcomes = check_project(root.path());
        assert!(failures(&outcomes).is_empty());
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, CheckOutcome::Pass(m) if m == "manifest pyproject.toml")));
    }

    #[test]
    fn test_broken_manifest_fails() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("pyproject.toml"), "[project\nname = 1").unwrap();
        fs::write(root.path().join("package.json"), r#"{"version": "1.0.0"}"#).unwrap();
        let outcomes = check_project(root.path());
        let failed = failures(&outcomes);
        assert_eq!(failed.len(), 2);
        assert!(failed[0].contains("invalid TOML"));
        assert!(failed[1].contains("missing expected section"));
    }
}
