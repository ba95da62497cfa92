//! Markdown → document tree boundary.
//!
//! Section content arrives from the model as Markdown. Turning it into a
//! node tree is the job of a [`ContentParser`]; the full extended-syntax
//! parser used by the editor lives outside this crate and plugs in through
//! the trait.
//!
//! [`MarkdownParser`] is the built-in default. It covers the block
//! constructs lessons are mostly made of:
//!
//! | Markdown | Node |
//! |----------|------|
//! | `# Title` … `###### Title` | `heading` (`attrs.level`) |
//! | plain lines | `paragraph` |
//! | `- item` / `* item` | `bulletList` › `listItem` › `paragraph` |
//! | `1. item` | `orderedList` (`attrs.start`) |
//! | `> quote` | `blockquote` (contents parsed recursively) |
//! | fenced code | `codeBlock` (`attrs.language`) |
//! | `---` | `horizontalRule` |
//!
//! Inline `**bold**` and `` `code` `` become text marks; everything else is
//! kept as literal text. An unterminated code fence is a parse error.

use anyhow::{bail, Result};
use lesson_harness_core::models::{Document, ElementNode, Mark, Node, NodeKind, TextNode};
use serde_json::{Map, Value};

/// Converts section source text into a document.
pub trait ContentParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<Document>;
}

/// Built-in block-level Markdown parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownParser;

enum ListKind {
    Bullet,
    Ordered(u64),
}

impl ContentParser for MarkdownParser {
    fn parse(&self, source: &str) -> Result<Document> {
        let lines: Vec<&str> = source.lines().collect();
        let mut blocks = Vec::new();
        let mut paragraph: Vec<&str> = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let trimmed = line.trim();

            if trimmed.is_empty() {
                flush_paragraph(&mut paragraph, &mut blocks);
                i += 1;
                continue;
            }

            if let Some(info) = trimmed.strip_prefix("```") {
                flush_paragraph(&mut paragraph, &mut blocks);
                let start_line = i + 1;
                let mut body = Vec::new();
                i += 1;
                loop {
                    match lines.get(i) {
                        Some(l) if l.trim_start().starts_with("```") => break,
                        Some(l) => body.push(*l),
                        None => bail!("unclosed code fence starting at line {}", start_line),
                    }
                    i += 1;
                }
                blocks.push(code_block(info.trim(), &body.join("\n")));
                i += 1;
                continue;
            }

            if let Some((level, text)) = heading(trimmed) {
                flush_paragraph(&mut paragraph, &mut blocks);
                let mut attrs = Map::new();
                attrs.insert("level".to_string(), Value::from(level));
                blocks.push(Node::Element(ElementNode {
                    kind: NodeKind::Heading,
                    attrs: Some(attrs),
                    content: Some(parse_inline(text)),
                }));
                i += 1;
                continue;
            }

            if is_rule(trimmed) {
                flush_paragraph(&mut paragraph, &mut blocks);
                blocks.push(Node::Element(ElementNode {
                    kind: NodeKind::HorizontalRule,
                    attrs: None,
                    content: None,
                }));
                i += 1;
                continue;
            }

            if trimmed.starts_with('>') {
                flush_paragraph(&mut paragraph, &mut blocks);
                let mut quoted = Vec::new();
                while let Some(l) = lines.get(i) {
                    match l.trim().strip_prefix('>') {
                        Some(rest) => quoted.push(rest.strip_prefix(' ').unwrap_or(rest)),
                        None => break,
                    }
                    i += 1;
                }
                let inner = self.parse(&quoted.join("\n"))?;
                blocks.push(Node::element(NodeKind::Blockquote, inner.content));
                continue;
            }

            if let Some((kind, _)) = list_item(trimmed) {
                flush_paragraph(&mut paragraph, &mut blocks);
                let mut items = Vec::new();
                while let Some(l) = lines.get(i) {
                    match list_item(l.trim()) {
                        Some((k, text)) if same_list(&kind, &k) => {
                            items.push(Node::element(
                                NodeKind::ListItem,
                                vec![Node::element(NodeKind::Paragraph, parse_inline(text))],
                            ));
                        }
                        _ => break,
                    }
                    i += 1;
                }
                blocks.push(list_node(kind, items));
                continue;
            }

            paragraph.push(trimmed);
            i += 1;
        }

        flush_paragraph(&mut paragraph, &mut blocks);
        Ok(Document::new(blocks))
    }
}

fn flush_paragraph(lines: &mut Vec<&str>, blocks: &mut Vec<Node>) {
    if lines.is_empty() {
        return;
    }
    let text = lines.join(" ");
    lines.clear();
    blocks.push(Node::element(NodeKind::Paragraph, parse_inline(&text)));
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if rest.is_empty() {
        return Some((hashes as u8, ""));
    }
    rest.strip_prefix(' ').map(|t| (hashes as u8, t.trim()))
}

fn is_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && (compact.chars().all(|c| c == '-')
            || compact.chars().all(|c| c == '*')
            || compact.chars().all(|c| c == '_'))
}

fn list_item(line: &str) -> Option<(ListKind, &str)> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some((ListKind::Bullet, rest.trim()));
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(text) = rest.strip_prefix(". ") {
            let start = line[..digits].parse().unwrap_or(1);
            return Some((ListKind::Ordered(start), text.trim()));
        }
    }
    None
}

fn same_list(a: &ListKind, b: &ListKind) -> bool {
    matches!(
        (a, b),
        (ListKind::Bullet, ListKind::Bullet) | (ListKind::Ordered(_), ListKind::Ordered(_))
    )
}

fn list_node(kind: ListKind, items: Vec<Node>) -> Node {
    match kind {
        ListKind::Bullet => Node::element(NodeKind::BulletList, items),
        ListKind::Ordered(start) => {
            let mut attrs = Map::new();
            attrs.insert("start".to_string(), Value::from(start));
            Node::Element(ElementNode {
                kind: NodeKind::OrderedList,
                attrs: Some(attrs),
                content: Some(items),
            })
        }
    }
}

fn code_block(language: &str, body: &str) -> Node {
    let mut attrs = Map::new();
    attrs.insert(
        "language".to_string(),
        if language.is_empty() {
            Value::Null
        } else {
            Value::from(language)
        },
    );
    let content = if body.is_empty() {
        Vec::new()
    } else {
        vec![Node::text(body)]
    };
    Node::Element(ElementNode {
        kind: NodeKind::CodeBlock,
        attrs: Some(attrs),
        content: Some(content),
    })
}

/// Split a line into text leaves, marking `**bold**` and `` `code` `` spans.
fn parse_inline(text: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let bold = rest.find("**");
        let code = rest.find('`');
        let (pos, delim, mark) = match (bold, code) {
            (Some(b), Some(c)) if c < b => (c, "`", "code"),
            (Some(b), _) => (b, "**", "bold"),
            (None, Some(c)) => (c, "`", "code"),
            (None, None) => break,
        };
        let after = &rest[pos + delim.len()..];
        match after.find(delim) {
            Some(end) if end > 0 => {
                push_text(&mut nodes, &rest[..pos], None);
                push_text(&mut nodes, &after[..end], Some(mark));
                rest = &after[end + delim.len()..];
            }
            _ => {
                // Unmatched delimiter: keep it literally.
                push_text(&mut nodes, &rest[..pos + delim.len()], None);
                rest = after;
            }
        }
    }
    push_text(&mut nodes, rest, None);
    nodes
}

fn push_text(nodes: &mut Vec<Node>, text: &str, mark: Option<&str>) {
    if text.is_empty() {
        return;
    }
    let marks: Vec<Mark> = mark
        .map(|m| Mark {
            mark_type: m.to_string(),
            attrs: None,
        })
        .into_iter()
        .collect();
    // Merge with a preceding unmarked leaf so literal delimiters do not
    // fragment the text.
    if marks.is_empty() {
        if let Some(Node::Text(prev)) = nodes.last_mut() {
            if prev.marks.is_empty() {
                prev.text.push_str(text);
                return;
            }
        }
    }
    nodes.push(Node::Text(TextNode {
        text: text.to_string(),
        marks,
    }));
}
