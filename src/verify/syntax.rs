//! Format-aware syntax checks
//!
//! Dispatch is by extension only. Formats without a checker pass as long as
//! the file decoded as UTF-8.

use serde::Deserialize;
use std::cell::RefCell;
use std::path::Path;
use tree_sitter::{Node, Parser};

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // Ignore error here - a parser without a language returns None at parse time
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Python,
    Json,
    Yaml,
    Toml,
    Other,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "py" => FileFormat::Python,
            "json" => FileFormat::Json,
            "yaml" | "yml" => FileFormat::Yaml,
            "toml" => FileFormat::Toml,
            _ => FileFormat::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileFormat::Python => "python",
            FileFormat::Json => "json",
            FileFormat::Yaml => "yaml",
            FileFormat::Toml => "toml",
            FileFormat::Other => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxOutcome {
    Valid,
    Invalid(String),
    /// No checker could run (e.g. the parser failed to initialise)
    Skipped(String),
}

pub fn check_syntax(format: FileFormat, content: &str) -> SyntaxOutcome {
    match format {
        FileFormat::Python => check_python(content),
        FileFormat::Json => match serde_json::from_str::<serde_json::Value>(content) {
            Ok(_) => SyntaxOutcome::Valid,
            Err(e) => SyntaxOutcome::Invalid(format!("JSON decode error: {}", e)),
        },
        FileFormat::Yaml => check_yaml(content),
        FileFormat::Toml => match toml::from_str::<toml::Table>(content) {
            Ok(_) => SyntaxOutcome::Valid,
            Err(e) => {
                let location = e
                    .span()
                    .map(|span| format!(" (line {})", line_of_offset(content, span.start)))
                    .unwrap_or_default();
                SyntaxOutcome::Invalid(format!("TOML decode error: {}{}", e.message(), location))
            }
        },
        FileFormat::Other => SyntaxOutcome::Valid,
    }
}

fn line_of_offset(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

/// Safe-parse every document in the stream; YAML files often hold several.
fn check_yaml(content: &str) -> SyntaxOutcome {
    for document in serde_yaml::Deserializer::from_str(content) {
        if let Err(e) = serde_yaml::Value::deserialize(document) {
            return SyntaxOutcome::Invalid(format!("YAML error: {}", e));
        }
    }
    SyntaxOutcome::Valid
}

fn check_python(content: &str) -> SyntaxOutcome {
    let tree = PYTHON_PARSER.with(|p| p.borrow_mut().parse(content, None));
    let Some(tree) = tree else {
        return SyntaxOutcome::Skipped("Python parser unavailable".to_string());
    };
    let root = tree.root_node();
    if !root.has_error() {
        return match first_python3_violation(root) {
            Some((node, message)) => {
                let pos = node.start_position();
                SyntaxOutcome::Invalid(format!(
                    "SyntaxError: {} (line {}, column {})",
                    message,
                    pos.row + 1,
                    pos.column + 1
                ))
            }
            None => SyntaxOutcome::Valid,
        };
    }

    match first_error_node(root) {
        Some(node) => {
            let pos = node.start_position();
            let detail = if node.is_missing() {
                format!("missing `{}`", node.kind())
            } else {
                let snippet = node
                    .utf8_text(content.as_bytes())
                    .map(|s| s.lines().next().unwrap_or("").trim().to_string())
                    .unwrap_or_default();
                if snippet.is_empty() {
                    "invalid syntax".to_string()
                } else {
                    format!(
                        "invalid syntax near `{}`",
                        crate::util::truncate(&snippet, 40)
                    )
                }
            };
            SyntaxOutcome::Invalid(format!(
                "SyntaxError: {} (line {}, column {})",
                detail,
                pos.row + 1,
                pos.column + 1
            ))
        }
        None => SyntaxOutcome::Invalid("SyntaxError: invalid syntax".to_string()),
    }
}

/// The grammar still accepts some Python 2 forms and a few constructs the
/// compiler rejects. Find the first of those in source order.
fn first_python3_violation(root: Node<'_>) -> Option<(Node<'_>, &'static str)> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if let Some(found) = python3_violation(node) {
            return Some(found);
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

fn python3_violation(node: Node<'_>) -> Option<(Node<'_>, &'static str)> {
    match node.kind() {
        "print_statement" => Some((node, "Missing parentheses in call to 'print'")),
        "exec_statement" => Some((node, "Missing parentheses in call to 'exec'")),
        "return_statement" if !in_function_scope(node) => Some((node, "'return' outside function")),
        "nonlocal_statement" if !has_function_ancestor(node) => {
            Some((node, "nonlocal declaration not allowed at module level"))
        }
        "argument_list" => positional_after_keyword(node)
            .map(|arg| (arg, "positional argument follows keyword argument")),
        _ => None,
    }
}

/// `return` binds to the nearest enclosing scope; a class body is not a
/// function even when the class sits inside one.
fn in_function_scope(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "function_definition" => return true,
            "class_definition" => return false,
            _ => current = parent.parent(),
        }
    }
    false
}

fn has_function_ancestor(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.kind() == "function_definition" {
            return true;
        }
        current = parent.parent();
    }
    false
}

fn positional_after_keyword(args: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = args.walk();
    let mut seen_keyword = false;
    for arg in args.named_children(&mut cursor) {
        match arg.kind() {
            "keyword_argument" | "dictionary_splat" => seen_keyword = true,
            // `f(a=1, *rest)` is legal
            "list_splat" | "comment" => {}
            _ if seen_keyword => return Some(arg),
            _ => {}
        }
    }
    None
}

/// Depth-first search for the earliest ERROR or MISSING node.
fn first_error_node(root: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}
