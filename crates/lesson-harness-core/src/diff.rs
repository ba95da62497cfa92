//! Anchored, node-granular document edits.
//!
//! The model does not know node indices, so edits are addressed by text:
//! a `before_content` anchor locates where new nodes go, and an optional
//! `delete_content` string selects nodes to drop. Both are plain substring
//! searches over the document's flattened text (the in-order concatenation
//! of every text leaf), resolved to the **top-level node** that contains
//! the match start. Edits always add or remove whole top-level nodes.
//!
//! # Rules
//!
//! | `before_content` | Effect |
//! |------------------|--------|
//! | absent / empty   | append `insert_nodes` to the end |
//! | found            | apply deletions, then splice after the anchor node |
//! | not found        | fail, document unchanged |
//!
//! A provided `delete_content` that matches no node also fails the whole
//! edit. On failure the returned document equals the input; on success it
//! is a new tree and the input is never touched.
//!
//! # Delete scope
//!
//! [`DeleteScope::AllMatching`] removes every top-level node whose text
//! contains the delete string, which can remove more than one node when the
//! string is common. [`DeleteScope::NearestAfterAnchor`] removes only the
//! first matching node at or after the anchor node.

use serde::{Deserialize, Serialize};

use crate::models::{flatten_text, Document, Node};
use crate::validate::validate_document;

/// Maximum characters of an anchor echoed back in failure messages.
const PREVIEW_CHARS: usize = 60;

/// Which nodes a `delete_content` string removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    /// Every top-level node whose text contains the string.
    #[default]
    AllMatching,
    /// Only the first matching node at or after the anchor node.
    NearestAfterAnchor,
}

/// Result of [`apply_diff`]. `document` is the edited tree on success and
/// an unmodified copy of the input on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffResult {
    pub success: bool,
    pub document: Document,
    pub message: String,
}

impl DiffResult {
    fn failure(doc: &Document, message: String) -> Self {
        tracing::debug!(%message, "diff rejected");
        Self {
            success: false,
            document: doc.clone(),
            message,
        }
    }
}

/// Apply an anchored edit using the default [`DeleteScope`].
pub fn apply_diff(
    doc: &Document,
    before_content: Option<&str>,
    delete_content: Option<&str>,
    insert_nodes: Vec<Node>,
) -> DiffResult {
    apply_diff_with_scope(
        doc,
        before_content,
        delete_content,
        insert_nodes,
        DeleteScope::default(),
    )
}

/// Apply an anchored edit with an explicit [`DeleteScope`].
pub fn apply_diff_with_scope(
    doc: &Document,
    before_content: Option<&str>,
    delete_content: Option<&str>,
    insert_nodes: Vec<Node>,
    scope: DeleteScope,
) -> DiffResult {
    let before = before_content.filter(|s| !s.is_empty());
    let delete = delete_content.filter(|s| !s.is_empty());
    let texts: Vec<String> = doc.content.iter().map(flatten_text).collect();

    let anchor = match before {
        Some(needle) => match locate_in(&texts, needle) {
            Some(index) => Some(index),
            None => {
                return DiffResult::failure(
                    doc,
                    format!(
                        "Could not find beforeContent \"{}\" in the document. \
                         Use the exact text of an existing node, or omit beforeContent to append.",
                        preview(needle)
                    ),
                )
            }
        },
        None => None,
    };

    let doomed: Vec<usize> = match delete {
        Some(needle) => {
            let matches = match scope {
                DeleteScope::AllMatching => texts
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.contains(needle))
                    .map(|(i, _)| i)
                    .collect::<Vec<_>>(),
                DeleteScope::NearestAfterAnchor => texts
                    .iter()
                    .enumerate()
                    .skip(anchor.unwrap_or(0))
                    .find(|(_, t)| t.contains(needle))
                    .map(|(i, _)| vec![i])
                    .unwrap_or_default(),
            };
            if matches.is_empty() {
                return DiffResult::failure(
                    doc,
                    format!(
                        "Could not find deleteContent \"{}\" in any node of the document.",
                        preview(needle)
                    ),
                );
            }
            matches
        }
        None => Vec::new(),
    };

    let mut content: Vec<Node> = doc
        .content
        .iter()
        .enumerate()
        .filter(|(i, _)| doomed.binary_search(i).is_err())
        .map(|(_, n)| n.clone())
        .collect();

    // The anchor node may itself have been deleted; in that case the new
    // nodes take its former slot.
    let insert_at = match anchor {
        None => content.len(),
        Some(a) => {
            let removed_before = doomed.iter().filter(|&&i| i < a).count();
            if doomed.binary_search(&a).is_ok() {
                a - removed_before
            } else {
                a - removed_before + 1
            }
        }
    };

    let inserted = insert_nodes.len();
    content.splice(insert_at..insert_at, insert_nodes);

    let updated = Document {
        attrs: doc.attrs.clone(),
        content,
    };

    let report = validate_document(&updated);
    if !report.valid {
        return DiffResult::failure(
            doc,
            format!("Edit produced an invalid document: {}", report.summary()),
        );
    }

    let message = match anchor {
        None if doomed.is_empty() => format!("Appended {} node(s) to the end of the document.", inserted),
        None => format!(
            "Deleted {} node(s) and appended {} node(s) to the end of the document.",
            doomed.len(),
            inserted
        ),
        Some(a) if doomed.is_empty() => format!("Inserted {} node(s) after node {}.", inserted, a),
        Some(a) => format!(
            "Deleted {} node(s) and inserted {} node(s) after node {}.",
            doomed.len(),
            inserted,
            a
        ),
    };

    tracing::debug!(
        anchor = ?anchor,
        deleted = doomed.len(),
        inserted,
        nodes = updated.content.len(),
        "diff applied"
    );

    DiffResult {
        success: true,
        document: updated,
        message,
    }
}

/// Index of the top-level node containing the start of the first
/// occurrence of `needle` in the document's flattened text.
pub fn locate_anchor(doc: &Document, needle: &str) -> Option<usize> {
    let texts: Vec<String> = doc.content.iter().map(flatten_text).collect();
    locate_in(&texts, needle)
}

fn locate_in(texts: &[String], needle: &str) -> Option<usize> {
    let flat: String = texts.concat();
    let pos = flat.find(needle)?;
    let mut start = 0;
    for (i, t) in texts.iter().enumerate() {
        let end = start + t.len();
        if pos >= start && pos < end {
            return Some(i);
        }
        start = end;
    }
    None
}

fn preview(s: &str) -> String {
    if s.chars().count() <= PREVIEW_CHARS {
        s.to_string()
    } else {
        let head: String = s.chars().take(PREVIEW_CHARS).collect();
        format!("{}…", head)
    }
}
