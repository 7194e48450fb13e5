//! Post-apply verification
//!
//! Runs a small set of fast, local checks on the files a fix touched, plus a
//! few project-wide sanity checks. The goal is a clear report, not exhaustive
//! CI: nothing here executes project tooling, and a failed verification never
//! undoes a fix on its own.

mod project;
mod syntax;

pub use syntax::{check_syntax, FileFormat, SyntaxOutcome};

use crate::config::Config;
use crate::project::ProjectRoot;
use crate::suggest::FixSuggestion;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Base names that commonly hold credentials
const SENSITIVE_STEMS: &[&str] = &["config", "settings", "secrets", "credentials"];
const MAX_LONG_LINES_REPORTED: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass(String),
    Fail(String),
    Warn(String),
    Skip(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub success: bool,
    pub checks_passed: Vec<String>,
    pub checks_failed: Vec<String>,
    pub warnings: Vec<String>,
    /// Checks that could not run; they neither pass nor fail
    pub skipped: Vec<String>,
}

impl VerificationReport {
    fn record(&mut self, outcome: CheckOutcome) {
        match outcome {
            CheckOutcome::Pass(msg) => self.checks_passed.push(msg),
            CheckOutcome::Fail(msg) => self.checks_failed.push(msg),
            CheckOutcome::Warn(msg) => self.warnings.push(msg),
            CheckOutcome::Skip(msg) => self.skipped.push(msg),
        }
    }
}

/// Thresholds for the non-fatal content warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyLimits {
    pub max_file_size_bytes: u64,
    pub max_python_line_length: usize,
}

impl Default for VerifyLimits {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 1024 * 1024,
            max_python_line_length: 120,
        }
    }
}

impl From<&Config> for VerifyLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_file_size_bytes: config.max_file_size_bytes,
            max_python_line_length: config.max_python_line_length,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationPipeline {
    project: ProjectRoot,
    limits: VerifyLimits,
}

impl VerificationPipeline {
    pub fn new(project: ProjectRoot) -> Self {
        Self {
            project,
            limits: VerifyLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: VerifyLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn verify(&self, suggestion: &FixSuggestion) -> VerificationReport {
        let mut report = VerificationReport::default();

        for file in suggestion.target_files() {
            let absolute = self.project.absolute(&file);
            for outcome in self.check_file(&file, &absolute) {
                report.record(outcome);
            }
        }

        for outcome in project::check_project(self.project.path()) {
            report.record(outcome);
        }

        report.success = report.checks_failed.is_empty();
        tracing::info!(
            passed = report.checks_passed.len(),
            failed = report.checks_failed.len(),
            warnings = report.warnings.len(),
            "verification finished"
        );
        report
    }

    fn check_file(&self, display: &Path, absolute: &Path) -> Vec<CheckOutcome> {
        let name = display.display().to_string();
        let mut outcomes = Vec::new();

        if !absolute.is_file() {
            outcomes.push(CheckOutcome::Fail(format!("{}: file does not exist", name)));
            return outcomes;
        }
        outcomes.push(CheckOutcome::Pass(format!("{}: exists", name)));

        let content = match fs::read(absolute) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    outcomes.push(CheckOutcome::Fail(format!(
                        "{}: not valid UTF-8 ({})",
                        name,
                        e.utf8_error()
                    )));
                    return outcomes;
                }
            },
            Err(e) => {
                outcomes.push(CheckOutcome::Fail(format!("{}: unreadable: {}", name, e)));
                return outcomes;
            }
        };
        outcomes.push(CheckOutcome::Pass(format!("{}: readable", name)));

        let format = FileFormat::from_path(display);
        outcomes.push(match check_syntax(format, &content) {
            SyntaxOutcome::Valid => CheckOutcome::Pass(format!("{}: {} syntax", name, format.label())),
            SyntaxOutcome::Invalid(msg) => CheckOutcome::Fail(format!("{}: {}", name, msg)),
            SyntaxOutcome::Skipped(why) => {
                CheckOutcome::Skip(format!("{}: {} syntax skipped ({})", name, format.label(), why))
            }
        });

        outcomes.extend(
            content_warnings(display, &content, format, self.limits)
                .into_iter()
                .map(|w| CheckOutcome::Warn(format!("{}: {}", name, w))),
        );
        outcomes
    }
}

fn todo_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(TODO|FIXME)\b").ok()).as_ref()
}

fn secret_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(password|passwd|secret|api[_-]?key|token)").ok())
        .as_ref()
}

fn is_sensitive_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = file_name.to_ascii_lowercase();
    if lower == ".env" || lower.starts_with(".env.") {
        return true;
    }
    let stem = lower.split('.').next().unwrap_or("");
    SENSITIVE_STEMS.contains(&stem)
}

/// Advisory findings; none of these affect `success`.
fn content_warnings(
    path: &Path,
    content: &str,
    format: FileFormat,
    limits: VerifyLimits,
) -> Vec<String> {
    let mut warnings = Vec::new();

    let size = content.len() as u64;
    if size > limits.max_file_size_bytes {
        warnings.push(format!(
            "large file ({} bytes, limit {})",
            size, limits.max_file_size_bytes
        ));
    }
    if content.is_empty() {
        warnings.push("file is empty".to_string());
    }

    if format == FileFormat::Python {
        let long_lines: Vec<usize> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| line.chars().count() > limits.max_python_line_length)
            .map(|(i, _)| i + 1)
            .collect();
        if !long_lines.is_empty() {
            let shown: Vec<String> = long_lines
                .iter()
                .take(MAX_LONG_LINES_REPORTED)
                .map(|n| n.to_string())
                .collect();
            let more = long_lines.len().saturating_sub(MAX_LONG_LINES_REPORTED);
            warnings.push(format!(
                "{} line(s) longer than {} characters (lines {}{})",
                long_lines.len(),
                limits.max_python_line_length,
                shown.join(", "),
                if more > 0 {
                    format!(", +{} more", more)
                } else {
                    String::new()
                }
            ));
        }

        if let Some(re) = todo_regex() {
            let markers = content.lines().filter(|line| re.is_match(line)).count();
            if markers > 0 {
                warnings.push(format!("{} TODO/FIXME marker(s)", markers));
            }
        }
    }

    if is_sensitive_file(path) {
        if let Some(re) = secret_regex() {
            if re.is_match(content) {
                warnings.push("possible secret in sensitive file".to_string());
            }
        }
    }

    warnings
}
