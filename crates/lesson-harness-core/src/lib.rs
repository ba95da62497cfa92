//! # Lesson Harness Core
//!
//! The document/agent state core of Lesson Harness: the pieces that let a
//! tool-calling agent build and edit a large node-tree lesson document in
//! small steps, page through it chunk by chunk, and roll back to earlier
//! snapshots.
//!
//! All operations are synchronous and in-memory. This crate has no tokio,
//! filesystem, or network dependencies.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Node tree, wire shape, text traversal |
//! | [`validate`] | Structural checks for raw and typed documents |
//! | [`chunk`] | Node-boundary chunking and merging |
//! | [`diff`] | Text-anchored, node-granular edits |
//! | [`document_state`] | Working document, chunk cursor, lesson hierarchy |
//! | [`conversation`] | Message log and agent status |
//! | [`checkpoint`] | Snapshots and a bounded checkpoint store |
//! | [`error`] | Typed errors |

pub mod checkpoint;
pub mod chunk;
pub mod conversation;
pub mod diff;
pub mod document_state;
pub mod error;
pub mod models;
pub mod validate;

pub use checkpoint::{create_checkpoint, restore_checkpoint, Checkpoint, CheckpointManager};
pub use chunk::{chunk_document, merge_chunks, rechunk_document, DocumentChunk};
pub use conversation::{AgentStatus, ChatMessage, ConversationState};
pub use diff::{apply_diff, apply_diff_with_scope, DeleteScope, DiffResult};
pub use document_state::{DocumentState, Lesson, LessonSection};
pub use error::{ModelError, StateError};
pub use models::{Document, Node, NodeKind};
pub use validate::{validate_document, validate_value, ValidationReport};
