//! Snapshots of the full agent state for rollback.
//!
//! A [`Checkpoint`] holds deep copies of the conversation log, its metadata
//! and the complete [`DocumentState`] (document, chunk cursor, hierarchy).
//! Its fields are private and only readable, so a stored checkpoint cannot
//! be changed after capture, and nothing in it is shared with live state.
//!
//! [`CheckpointManager`] is a bounded store in insertion order. Saving past
//! `max_checkpoints` evicts the oldest entry.
//!
//! ```rust
//! use lesson_harness_core::checkpoint::{create_checkpoint, restore_checkpoint, CheckpointManager};
//! use lesson_harness_core::conversation::ConversationState;
//! use lesson_harness_core::document_state::DocumentState;
//! use lesson_harness_core::models::{Document, Node};
//!
//! let mut conversation = ConversationState::new();
//! let mut documents = DocumentState::default();
//! documents.initialize(Document::new(vec![Node::paragraph("v1")]));
//!
//! let mut manager = CheckpointManager::default();
//! manager.save(create_checkpoint(&conversation, &documents, Some("before edit".into()), Default::default()));
//!
//! documents.update_document(Document::new(vec![Node::paragraph("v2")]));
//! let latest = manager.get_latest().unwrap().clone();
//! restore_checkpoint(&latest, &mut conversation, &mut documents);
//! assert_eq!(documents.document().content[0], Node::paragraph("v1"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::conversation::{ChatMessage, ConversationState};
use crate::document_state::DocumentState;
use crate::models::{content_hash, Document};

/// Default number of checkpoints kept by a [`CheckpointManager`].
pub const DEFAULT_MAX_CHECKPOINTS: usize = 10;

/// Descriptive data recorded alongside a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub message_count: usize,
    pub lesson_count: usize,
    /// SHA-256 of the captured working document.
    pub document_hash: String,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// Immutable snapshot of conversation and document state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    id: String,
    conversation_messages: Vec<ChatMessage>,
    conversation_metadata: Map<String, Value>,
    document_state: DocumentState,
    timestamp: DateTime<Utc>,
    metadata: CheckpointMetadata,
}

impl Checkpoint {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn conversation_messages(&self) -> &[ChatMessage] {
        &self.conversation_messages
    }

    /// The working document as it was at capture time.
    pub fn document_snapshot(&self) -> &Document {
        self.document_state.document()
    }

    pub fn document_state(&self) -> &DocumentState {
        &self.document_state
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> &CheckpointMetadata {
        &self.metadata
    }
}

/// Deep-copy both live states into a new checkpoint with a fresh id.
pub fn create_checkpoint(
    conversation: &ConversationState,
    documents: &DocumentState,
    label: Option<String>,
    extra: Map<String, Value>,
) -> Checkpoint {
    let metadata = CheckpointMetadata {
        label,
        message_count: conversation.len(),
        lesson_count: documents.lessons().len(),
        document_hash: content_hash(documents.document()),
        extra,
    };
    let checkpoint = Checkpoint {
        id: Uuid::new_v4().to_string(),
        conversation_messages: conversation.messages().to_vec(),
        conversation_metadata: conversation.metadata().clone(),
        document_state: documents.clone(),
        timestamp: Utc::now(),
        metadata,
    };
    tracing::debug!(
        id = %checkpoint.id,
        messages = checkpoint.metadata.message_count,
        "checkpoint created"
    );
    checkpoint
}

/// Copy a checkpoint's snapshots back into the live states and set the
/// agent status to idle. The checkpoint itself is left untouched.
pub fn restore_checkpoint(
    checkpoint: &Checkpoint,
    conversation: &mut ConversationState,
    documents: &mut DocumentState,
) {
    conversation.restore(
        checkpoint.conversation_messages.clone(),
        checkpoint.conversation_metadata.clone(),
    );
    *documents = checkpoint.document_state.clone();
    tracing::info!(id = %checkpoint.id, "checkpoint restored");
}

/// Bounded, insertion-ordered checkpoint store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointManager {
    checkpoints: Vec<Checkpoint>,
    max_checkpoints: usize,
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHECKPOINTS)
    }
}

impl CheckpointManager {
    /// A `max_checkpoints` of 0 is treated as 1.
    pub fn new(max_checkpoints: usize) -> Self {
        Self {
            checkpoints: Vec::new(),
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    /// Store a checkpoint. A checkpoint with the same id replaces the old
    /// entry. Returns the evicted checkpoint when the bound was exceeded.
    pub fn save(&mut self, checkpoint: Checkpoint) -> Option<Checkpoint> {
        self.checkpoints.retain(|c| c.id != checkpoint.id);
        self.checkpoints.push(checkpoint);
        if self.checkpoints.len() > self.max_checkpoints {
            let evicted = self.checkpoints.remove(0);
            tracing::debug!(id = %evicted.id, "checkpoint evicted");
            Some(evicted)
        } else {
            None
        }
    }

    pub fn get(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == id)
    }

    /// Most recently inserted checkpoint.
    pub fn get_latest(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// All checkpoints, oldest first.
    pub fn get_all(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn remove(&mut self, id: &str) -> Option<Checkpoint> {
        let pos = self.checkpoints.iter().position(|c| c.id == id)?;
        Some(self.checkpoints.remove(pos))
    }

    pub fn clear(&mut self) {
        self.checkpoints.clear();
    }

    pub fn count(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn max_checkpoints(&self) -> usize {
        self.max_checkpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::AgentStatus;
    use crate::models::Node;
    use serde_json::json;

    fn capture(conv: &ConversationState, docs: &DocumentState) -> Checkpoint {
        create_checkpoint(conv, docs, None, Map::new())
    }

    #[test]
    fn test_restore_is_not_aliased() {
        let mut conv = ConversationState::new();
        let mut docs = DocumentState::default();
        docs.initialize(Document::new(vec![Node::paragraph("original")]));
        conv.add_user_message("first");
        let captured_doc = docs.document().clone();

        let checkpoint = capture(&conv, &docs);

        docs.update_document(Document::new(vec![Node::paragraph("changed")]));
        docs.create_lesson("L", "l", "").unwrap();
        conv.add_ai_message("second");

        assert_eq!(checkpoint.document_snapshot(), &captured_doc);
        assert_eq!(checkpoint.conversation_messages().len(), 1);

        let mut conv2 = ConversationState::new();
        let mut docs2 = DocumentState::default();
        restore_checkpoint(&checkpoint, &mut conv2, &mut docs2);
        assert_eq!(docs2.document(), &captured_doc);
        assert!(docs2.lessons().is_empty());
        assert_eq!(conv2.len(), 1);

        // Mutating restored state leaves the checkpoint intact.
        docs2.update_document(Document::empty());
        assert_eq!(checkpoint.document_snapshot(), &captured_doc);
    }

    #[test]
    fn test_restore_resets_status_and_metadata() {
        let mut conv = ConversationState::new();
        let mut docs = DocumentState::default();
        conv.set_metadata("plan", json!(["a"]));
        let checkpoint = capture(&conv, &docs);

        conv.set_metadata("plan", json!(["a", "b"]));
        conv.set_status(AgentStatus::Error);
        restore_checkpoint(&checkpoint, &mut conv, &mut docs);

        assert_eq!(conv.status(), AgentStatus::Idle);
        assert_eq!(conv.get_metadata("plan"), Some(&json!(["a"])));
    }

    #[test]
    fn test_restore_brings_back_cursor() {
        let mut conv = ConversationState::new();
        let mut docs = DocumentState::new(1);
        docs.initialize(Document::new(vec![
            Node::paragraph("a"),
            Node::paragraph("b"),
            Node::paragraph("c"),
        ]));
        docs.read_next_chunk();
        let checkpoint = capture(&conv, &docs);
        docs.read_next_chunk();
        restore_checkpoint(&checkpoint, &mut conv, &mut docs);
        assert_eq!(docs.cursor(), 1);
    }

    #[test]
    fn test_metadata_is_filled_in() {
        let mut conv = ConversationState::new();
        let mut docs = DocumentState::default();
        conv.add_user_message("hi");
        docs.create_lesson("L", "l", "").unwrap();
        let mut extra = Map::new();
        extra.insert("step".to_string(), json!(3));
        let checkpoint = create_checkpoint(&conv, &docs, Some("after plan".to_string()), extra);

        let meta = checkpoint.metadata();
        assert_eq!(meta.label.as_deref(), Some("after plan"));
        assert_eq!(meta.message_count, 1);
        assert_eq!(meta.lesson_count, 1);
        assert_eq!(meta.document_hash.len(), 64);
        assert_eq!(meta.extra["step"], 3);
    }

    #[test]
    fn test_ids_are_unique() {
        let conv = ConversationState::new();
        let docs = DocumentState::default();
        assert_ne!(capture(&conv, &docs).id(), capture(&conv, &docs).id());
    }

    #[test]
    fn test_eviction_bound() {
        let conv = ConversationState::new();
        let docs = DocumentState::default();
        let mut manager = CheckpointManager::new(3);
        let saved: Vec<Checkpoint> = (0..5).map(|_| capture(&conv, &docs)).collect();
        let mut evicted = Vec::new();
        for c in &saved {
            if let Some(e) = manager.save(c.clone()) {
                evicted.push(e.id().to_string());
            }
        }

        assert_eq!(manager.count(), 3);
        let ids: Vec<&str> = manager.get_all().iter().map(|c| c.id()).collect();
        let expected: Vec<&str> = saved[2..].iter().map(|c| c.id()).collect();
        assert_eq!(ids, expected);
        assert_eq!(evicted, vec![saved[0].id().to_string(), saved[1].id().to_string()]);
        assert_eq!(manager.get_latest().map(|c| c.id()), Some(saved[4].id()));
        assert!(manager.get(saved[0].id()).is_none());
    }

    #[test]
    fn test_latest_is_by_insertion_not_restore() {
        let mut conv = ConversationState::new();
        let mut docs = DocumentState::default();
        let mut manager = CheckpointManager::default();
        let first = capture(&conv, &docs);
        let second = capture(&conv, &docs);
        manager.save(first.clone());
        manager.save(second.clone());

        restore_checkpoint(&first, &mut conv, &mut docs);
        assert_eq!(manager.get_latest().map(|c| c.id()), Some(second.id()));
    }

    #[test]
    fn test_remove_and_clear() {
        let conv = ConversationState::new();
        let docs = DocumentState::default();
        let mut manager = CheckpointManager::default();
        let a = capture(&conv, &docs);
        manager.save(a.clone());
        manager.save(capture(&conv, &docs));

        assert_eq!(manager.remove(a.id()).map(|c| c.id().to_string()), Some(a.id().to_string()));
        assert_eq!(manager.count(), 1);
        manager.clear();
        assert!(manager.is_empty());
        assert_eq!(manager.max_checkpoints(), DEFAULT_MAX_CHECKPOINTS);
    }

    #[test]
    fn test_resave_same_id_replaces() {
        let conv = ConversationState::new();
        let docs = DocumentState::default();
        let mut manager = CheckpointManager::default();
        let a = capture(&conv, &docs);
        manager.save(a.clone());
        manager.save(a.clone());
        assert_eq!(manager.count(), 1);
    }
}
