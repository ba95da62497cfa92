//! Node-boundary document chunker.
//!
//! Splits a [`Document`]'s top-level nodes into [`DocumentChunk`]s that
//! respect a configurable character budget, so a token-limited reader can
//! page through a large document one chunk at a time. Splitting only ever
//! happens between top-level nodes; a node is never cut in half.
//!
//! Each chunk carries a SHA-256 hash of its serialized content for
//! staleness detection by callers that cache chunks.
//!
//! # Algorithm
//!
//! 1. Measure each top-level node as the total length of its descendant
//!    text (markup is not counted).
//! 2. Accumulate nodes into a buffer until adding the next node would
//!    exceed `chunk_size`.
//! 3. When exceeded and the buffer is non-empty, flush it as a chunk and
//!    start a new one.
//! 4. A single node larger than `chunk_size` becomes its own oversized
//!    chunk.
//! 5. Flush the remaining buffer, then stamp `total_chunks` on every chunk.
//! 6. Guarantee at least one chunk per document (even when empty).
//!
//! # Example
//!
//! ```rust
//! use lesson_harness_core::chunk::{chunk_document, merge_chunks};
//! use lesson_harness_core::models::{Document, Node};
//!
//! let doc = Document::new(vec![Node::paragraph("Hello"), Node::paragraph("world")]);
//! let chunks = chunk_document(&doc, 5);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].total_chunks, 2);
//! assert_eq!(merge_chunks(&chunks), doc);
//! ```

use serde::{Deserialize, Serialize};

use crate::models::{content_hash, text_len, Document, Node};

/// Default per-chunk character budget.
pub const DEFAULT_CHUNK_SIZE: usize = 32_000;

/// A contiguous, node-aligned slice of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    /// Position of this chunk, starting at 0.
    pub index: usize,
    /// Number of chunks in the set this chunk belongs to.
    pub total_chunks: usize,
    /// The chunk's nodes wrapped as a standalone document.
    pub content: Document,
    /// Text length of the chunk's nodes.
    pub character_count: usize,
    /// Index of the first top-level node in the source document.
    pub start_node_index: usize,
    /// One past the last top-level node (`start..end`).
    pub end_node_index: usize,
    /// SHA-256 of the serialized `content`.
    pub hash: String,
}

/// Split a document into chunks on top-level node boundaries.
///
/// # Guarantees
///
/// - At least one chunk is always returned; an empty document yields one
///   chunk with `character_count == 0`.
/// - Chunk indices are contiguous: `0, 1, 2, …, N-1`, and every chunk has
///   `total_chunks == N`.
/// - Concatenating the chunks' nodes in index order reproduces
///   `doc.content` exactly.
/// - A `chunk_size` of 0 is treated as 1.
pub fn chunk_document(doc: &Document, chunk_size: usize) -> Vec<DocumentChunk> {
    let max_chars = chunk_size.max(1);

    let mut chunks = Vec::new();
    let mut current: Vec<Node> = Vec::new();
    let mut current_chars = 0;
    let mut start = 0;

    for (i, node) in doc.content.iter().enumerate() {
        let node_chars = text_len(node);

        if current_chars + node_chars > max_chars && !current.is_empty() {
            let nodes = std::mem::take(&mut current);
            chunks.push(make_chunk(chunks.len(), nodes, current_chars, start));
            current_chars = 0;
            start = i;
        }

        current.push(node.clone());
        current_chars += node_chars;
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(make_chunk(chunks.len(), current, current_chars, start));
    }

    let total = chunks.len();
    for chunk in &mut chunks {
        chunk.total_chunks = total;
    }

    tracing::debug!(
        nodes = doc.content.len(),
        chunks = total,
        chunk_size = max_chars,
        "chunked document"
    );

    chunks
}

/// Re-partition a document after it was replaced or edited.
///
/// Chunk boundaries are never maintained incrementally; this is a full
/// [`chunk_document`] pass.
pub fn rechunk_document(doc: &Document, chunk_size: usize) -> Vec<DocumentChunk> {
    chunk_document(doc, chunk_size)
}

/// Concatenate chunks back into one document, ordered by `index`.
pub fn merge_chunks(chunks: &[DocumentChunk]) -> Document {
    let mut ordered: Vec<&DocumentChunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);
    Document::new(
        ordered
            .into_iter()
            .flat_map(|c| c.content.content.iter().cloned())
            .collect(),
    )
}

/// Render a chunk as the text handed to the model: a header line followed
/// by the chunk's document JSON.
pub fn render_chunk(chunk: &DocumentChunk) -> String {
    let body = serde_json::to_string_pretty(&chunk.content).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Chunk {} of {} · nodes {}..{} · {} characters\n{}",
        chunk.index + 1,
        chunk.total_chunks,
        chunk.start_node_index,
        chunk.end_node_index,
        chunk.character_count,
        body
    )
}

fn make_chunk(index: usize, nodes: Vec<Node>, character_count: usize, start: usize) -> DocumentChunk {
    let end = start + nodes.len();
    let content = Document::new(nodes);
    let hash = content_hash(&content);

    DocumentChunk {
        index,
        total_chunks: 0,
        content,
        character_count,
        start_node_index: start,
        end_node_index: end,
        hash,
    }
}
