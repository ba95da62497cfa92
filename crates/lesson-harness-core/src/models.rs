//! Node-tree document model.
//!
//! The wire shape is the rich-text editor's JSON format and must stay
//! stable, since the rendering side consumes the same documents:
//!
//! ```json
//! { "type": "doc", "content": [
//!     { "type": "heading", "attrs": { "level": 1 },
//!       "content": [ { "type": "text", "text": "Title" } ] }
//! ] }
//! ```
//!
//! Known node kinds are modelled as [`NodeKind`] variants. Any other tag is
//! kept verbatim in [`NodeKind::Other`] together with its attrs and children,
//! so documents produced by the editor round-trip even when they contain
//! node types this crate has never heard of.
//!
//! Only [`TextNode`]s carry literal text. [`text_len`] and [`flatten_text`]
//! walk the tree with an explicit stack, so malformed or deeply nested input
//! cannot exhaust the call stack.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::ModelError;

/// Maximum nesting depth accepted by validation.
pub const MAX_DEPTH: usize = 256;

/// Tag of a non-text node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Doc,
    Paragraph,
    Heading,
    Blockquote,
    BulletList,
    OrderedList,
    ListItem,
    CodeBlock,
    HorizontalRule,
    HardBreak,
    Image,
    Table,
    TableRow,
    TableCell,
    TableHeader,
    /// Any tag outside the known set, preserved as written.
    Other(String),
}

impl NodeKind {
    /// Map a wire tag to a kind. Never fails; unknown tags become [`NodeKind::Other`].
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "doc" => NodeKind::Doc,
            "paragraph" => NodeKind::Paragraph,
            "heading" => NodeKind::Heading,
            "blockquote" => NodeKind::Blockquote,
            "bulletList" => NodeKind::BulletList,
            "orderedList" => NodeKind::OrderedList,
            "listItem" => NodeKind::ListItem,
            "codeBlock" => NodeKind::CodeBlock,
            "horizontalRule" => NodeKind::HorizontalRule,
            "hardBreak" => NodeKind::HardBreak,
            "image" => NodeKind::Image,
            "table" => NodeKind::Table,
            "tableRow" => NodeKind::TableRow,
            "tableCell" => NodeKind::TableCell,
            "tableHeader" => NodeKind::TableHeader,
            other => NodeKind::Other(other.to_string()),
        }
    }

    /// The wire tag for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Doc => "doc",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading => "heading",
            NodeKind::Blockquote => "blockquote",
            NodeKind::BulletList => "bulletList",
            NodeKind::OrderedList => "orderedList",
            NodeKind::ListItem => "listItem",
            NodeKind::CodeBlock => "codeBlock",
            NodeKind::HorizontalRule => "horizontalRule",
            NodeKind::HardBreak => "hardBreak",
            NodeKind::Image => "image",
            NodeKind::Table => "table",
            NodeKind::TableRow => "tableRow",
            NodeKind::TableCell => "tableCell",
            NodeKind::TableHeader => "tableHeader",
            NodeKind::Other(tag) => tag,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inline formatting applied to a text node (bold, italic, link, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub mark_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Map<String, Value>>,
}

/// Leaf node carrying literal text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub text: String,
    pub marks: Vec<Mark>,
}

/// Any non-text node.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub kind: NodeKind,
    pub attrs: Option<Map<String, Value>>,
    pub content: Option<Vec<Node>>,
}

impl ElementNode {
    /// Child nodes, or an empty slice when `content` is absent.
    pub fn children(&self) -> &[Node] {
        self.content.as_deref().unwrap_or(&[])
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.as_ref().and_then(|a| a.get(key))
    }
}

/// A node of the document tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawNode")]
pub enum Node {
    Text(TextNode),
    Element(ElementNode),
}

impl Node {
    /// Plain text leaf.
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks: Vec::new(),
        })
    }

    /// Element with the given kind and children.
    pub fn element(kind: NodeKind, content: Vec<Node>) -> Self {
        Node::Element(ElementNode {
            kind,
            attrs: None,
            content: Some(content),
        })
    }

    /// Paragraph holding a single text leaf (no children when `text` is empty).
    pub fn paragraph(text: impl Into<String>) -> Self {
        let text = text.into();
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(text)]
        };
        Node::element(NodeKind::Paragraph, content)
    }

    /// Heading of `level` holding a single text leaf.
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        let mut attrs = Map::new();
        attrs.insert("level".to_string(), Value::from(level));
        Node::Element(ElementNode {
            kind: NodeKind::Heading,
            attrs: Some(attrs),
            content: Some(vec![Node::text(text)]),
        })
    }

    /// Wire tag of this node (`"text"` for text leaves).
    pub fn node_type(&self) -> &str {
        match self {
            Node::Text(_) => "text",
            Node::Element(e) => e.kind.as_str(),
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Text(_) => &[],
            Node::Element(e) => e.children(),
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    attrs: Option<Map<String, Value>>,
    #[serde(default)]
    content: Option<Vec<Node>>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    marks: Option<Vec<Mark>>,
}

impl TryFrom<RawNode> for Node {
    type Error = ModelError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        match raw.node_type.as_str() {
            "" => Err(ModelError::EmptyType),
            "text" => {
                let text = raw.text.ok_or(ModelError::MissingText)?;
                Ok(Node::Text(TextNode {
                    text,
                    marks: raw.marks.unwrap_or_default(),
                }))
            }
            tag => Ok(Node::Element(ElementNode {
                kind: NodeKind::from_tag(tag),
                attrs: raw.attrs,
                content: raw.content,
            })),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            Node::Text(t) => {
                map.serialize_entry("type", "text")?;
                map.serialize_entry("text", &t.text)?;
                if !t.marks.is_empty() {
                    map.serialize_entry("marks", &t.marks)?;
                }
            }
            Node::Element(e) => {
                map.serialize_entry("type", e.kind.as_str())?;
                if let Some(attrs) = &e.attrs {
                    map.serialize_entry("attrs", attrs)?;
                }
                if let Some(content) = &e.content {
                    map.serialize_entry("content", content)?;
                }
            }
        }
        map.end()
    }
}

/// Root of a document: a `doc` node and its ordered top-level blocks.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "RawNode")]
pub struct Document {
    pub attrs: Option<Map<String, Value>>,
    pub content: Vec<Node>,
}

impl Document {
    pub fn new(content: Vec<Node>) -> Self {
        Self {
            attrs: None,
            content,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of top-level nodes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Total text length over all top-level nodes.
    pub fn text_len(&self) -> usize {
        self.content.iter().map(text_len).sum()
    }

    /// Concatenated text of the whole document.
    pub fn flatten_text(&self) -> String {
        self.content.iter().map(flatten_text).collect()
    }
}

impl TryFrom<RawNode> for Document {
    type Error = ModelError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        if raw.node_type != "doc" {
            return Err(ModelError::NotADocument(raw.node_type));
        }
        Ok(Document {
            attrs: raw.attrs,
            content: raw.content.unwrap_or_default(),
        })
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", "doc")?;
        if let Some(attrs) = &self.attrs {
            map.serialize_entry("attrs", attrs)?;
        }
        map.serialize_entry("content", &self.content)?;
        map.end()
    }
}

/// Number of characters (Unicode scalar values) in all descendant text
/// leaves of `node`. Markup is not counted.
pub fn text_len(node: &Node) -> usize {
    let mut total = 0;
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        match n {
            Node::Text(t) => total += t.text.chars().count(),
            Node::Element(e) => stack.extend(e.children()),
        }
    }
    total
}

/// Depth-first, in-order concatenation of all descendant text of `node`.
pub fn flatten_text(node: &Node) -> String {
    let mut out = String::new();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        match n {
            Node::Text(t) => out.push_str(&t.text),
            Node::Element(e) => stack.extend(e.children().iter().rev()),
        }
    }
    out
}

/// SHA-256 (hex) of the serialized value, used to detect content changes.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}
