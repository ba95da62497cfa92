//! Structural sanity checks for documents.
//!
//! Two entry points cover the two places documents come from:
//!
//! - [`validate_value`] inspects raw JSON received at the tool boundary,
//!   before it is decoded. It reports every problem it finds rather than
//!   stopping at the first one, so the model can fix them all in one retry.
//! - [`validate_document`] checks a typed [`Document`] produced in-process
//!   (by the diff applier or the content parser) before it is committed.
//!
//! Neither validates against a fixed node-type registry: unknown node
//! types pass.

use serde::Serialize;
use serde_json::Value;

use crate::models::{Document, Node, NodeKind, MAX_DEPTH};

/// Outcome of a validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// All errors joined into one line, for tool-result messages.
    pub fn summary(&self) -> String {
        self.errors.join("; ")
    }
}

/// Validate raw wire JSON: root `type == "doc"`, list-shaped `content` at
/// every level, a string `type` on every node, a string `text` on text
/// nodes, no nested `doc` nodes, and nesting no deeper than [`MAX_DEPTH`].
///
/// Anything this accepts also decodes into a [`Document`] that passes
/// [`validate_document`].
pub fn validate_value(value: &Value) -> ValidationReport {
    let mut errors = Vec::new();

    let root = match value.as_object() {
        Some(obj) => obj,
        None => {
            errors.push("document must be a JSON object".to_string());
            return ValidationReport::from_errors(errors);
        }
    };

    match root.get("type").and_then(Value::as_str) {
        Some("doc") => {}
        Some(other) => errors.push(format!("root node type must be \"doc\", found \"{}\"", other)),
        None => errors.push("root node is missing `type`".to_string()),
    }

    let mut stack: Vec<(&Value, String, usize)> = Vec::new();
    match root.get("content") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate().rev() {
                stack.push((item, format!("content[{}]", i), 1));
            }
        }
        Some(_) => errors.push("`content` must be a list".to_string()),
    }

    while let Some((node, path, depth)) = stack.pop() {
        if depth > MAX_DEPTH {
            errors.push(format!("{} exceeds the maximum nesting depth of {}", path, MAX_DEPTH));
            continue;
        }
        let obj = match node.as_object() {
            Some(obj) => obj,
            None => {
                errors.push(format!("{} must be an object", path));
                continue;
            }
        };
        match obj.get("type").and_then(Value::as_str) {
            None => errors.push(format!("{} is missing `type`", path)),
            Some("") => errors.push(format!("{} has an empty `type`", path)),
            Some("doc") => errors.push(format!("{} is a nested doc node", path)),
            Some("text") => {
                if !obj.get("text").map(Value::is_string).unwrap_or(false) {
                    errors.push(format!("{} is a text node without a `text` string", path));
                }
            }
            Some(_) => {}
        }
        match obj.get("content") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate().rev() {
                    stack.push((item, format!("{}.content[{}]", path, i), depth + 1));
                }
            }
            Some(_) => errors.push(format!("{}.content must be a list", path)),
        }
    }

    ValidationReport::from_errors(errors)
}

/// Validate a typed document: no empty type tags, no nested `doc` nodes,
/// nesting no deeper than [`MAX_DEPTH`].
pub fn validate_document(doc: &Document) -> ValidationReport {
    let mut errors = Vec::new();
    let mut stack: Vec<(&Node, String, usize)> = doc
        .content
        .iter()
        .enumerate()
        .rev()
        .map(|(i, n)| (n, format!("content[{}]", i), 1))
        .collect();

    while let Some((node, path, depth)) = stack.pop() {
        if depth > MAX_DEPTH {
            errors.push(format!("{} exceeds the maximum nesting depth of {}", path, MAX_DEPTH));
            continue;
        }
        if let Node::Element(e) = node {
            match &e.kind {
                NodeKind::Doc => errors.push(format!("{} is a nested doc node", path)),
                NodeKind::Other(tag) if tag.is_empty() => {
                    errors.push(format!("{} has an empty `type`", path))
                }
                _ => {}
            }
            for (i, child) in e.children().iter().enumerate().rev() {
                stack.push((child, format!("{}.content[{}]", path, i), depth + 1));
            }
        }
    }

    ValidationReport::from_errors(errors)
}
