//! One authoring session: live document, conversation log, checkpoints,
//! and the tools that connect them.
//!
//! [`AuthoringSession::call_tool`] is the single path by which tool calls
//! mutate state:
//!
//! 1. Append a `toolCall` message.
//! 2. Look the tool up and validate the arguments against its schema.
//! 3. Execute it against the [`DocumentState`].
//! 4. Append a `toolCallResult` message; any error becomes its text with
//!    `isError: true`.
//! 5. After a successful mutating call, take a checkpoint if
//!    `auto_checkpoint` is on.
//!
//! Rolling back restores the conversation log too, so messages recorded
//! after the checkpoint disappear along with the document edits.

use anyhow::{anyhow, bail, Context, Result};
use lesson_harness_core::checkpoint::{create_checkpoint, restore_checkpoint, CheckpointManager};
use lesson_harness_core::conversation::{AgentStatus, AiMessage, ConversationState};
use lesson_harness_core::diff::DeleteScope;
use lesson_harness_core::document_state::DocumentState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::config::Config;
use crate::markdown::{ContentParser, MarkdownParser};
use crate::tools::{validate_params, ToolContext, ToolRegistry};

/// What happened to one tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    pub tool_name: String,
    pub tool_call_id: String,
    pub result: String,
    pub is_error: bool,
    /// Set when the call triggered an automatic checkpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

/// Persisted form of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub documents: DocumentState,
    pub conversation: ConversationState,
    pub checkpoints: CheckpointManager,
}

pub struct AuthoringSession {
    documents: DocumentState,
    conversation: ConversationState,
    checkpoints: CheckpointManager,
    tools: ToolRegistry,
    parser: Box<dyn ContentParser>,
    delete_scope: DeleteScope,
    auto_checkpoint: bool,
}

impl AuthoringSession {
    /// Empty session with the built-in tools and Markdown parser.
    pub fn new(config: &Config) -> Self {
        Self::with_parts(config, ToolRegistry::with_builtins(), Box::new(MarkdownParser))
    }

    pub fn with_parts(config: &Config, tools: ToolRegistry, parser: Box<dyn ContentParser>) -> Self {
        Self {
            documents: DocumentState::new(config.chunking.chunk_size),
            conversation: ConversationState::new(),
            checkpoints: CheckpointManager::new(config.checkpoints.max_checkpoints),
            tools,
            parser,
            delete_scope: config.diff.delete_scope,
            auto_checkpoint: config.checkpoints.auto_checkpoint,
        }
    }

    /// Rebuild a session from a snapshot. Chunk size, delete scope and
    /// auto-checkpointing come from `config`.
    pub fn from_snapshot(config: &Config, snapshot: SessionSnapshot) -> Self {
        let mut session = Self::new(config);
        session.documents = snapshot.documents;
        if session.documents.chunk_size() != config.chunking.chunk_size {
            session.documents.set_chunk_size(config.chunking.chunk_size);
        }
        session.conversation = snapshot.conversation;
        session.checkpoints = snapshot.checkpoints;
        session
    }

    pub fn documents(&self) -> &DocumentState {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut DocumentState {
        &mut self.documents
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    // ── Conversation ────────────────────────────────────────────────

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.conversation.add_user_message(content);
    }

    pub fn add_ai_message(&mut self, content: impl Into<String>) {
        self.conversation.add_ai_message(content);
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        self.conversation.set_status(status);
    }

    pub fn messages_for_ai(&self) -> Vec<AiMessage> {
        self.conversation.get_messages_for_ai()
    }

    // ── Tools ───────────────────────────────────────────────────────

    /// Run one tool call and record it in the conversation.
    pub async fn call_tool(&mut self, name: &str, call_id: &str, args: Value) -> ToolOutcome {
        self.conversation.add_tool_call(name, call_id, args.clone());

        let (result, mutating) = match self.tools.find(name) {
            None => (Err(anyhow!("unknown tool: {}", name)), false),
            Some(tool) => {
                let mutating = tool.is_mutating();
                let result = match validate_params(&tool.parameters_schema(), &args) {
                    Ok(params) => {
                        let mut ctx = ToolContext::new(
                            &mut self.documents,
                            self.parser.as_ref(),
                            self.delete_scope,
                        );
                        tool.execute(params, &mut ctx).await
                    }
                    Err(e) => Err(e),
                };
                (result, mutating)
            }
        };

        let (text, is_error) = match result {
            Ok(text) => (text, false),
            Err(e) => (format!("{:#}", e), true),
        };
        if is_error {
            tracing::warn!(tool = name, call_id, error = %text, "tool call failed");
        } else {
            tracing::debug!(tool = name, call_id, "tool call succeeded");
        }
        self.conversation
            .add_tool_result(name, call_id, text.clone(), is_error);

        let checkpoint_id = if !is_error && mutating && self.auto_checkpoint {
            Some(self.checkpoint(Some(format!("after {}", name))))
        } else {
            None
        };

        ToolOutcome {
            tool_name: name.to_string(),
            tool_call_id: call_id.to_string(),
            result: text,
            is_error,
            checkpoint_id,
        }
    }

    // ── Checkpoints ─────────────────────────────────────────────────

    /// Capture the current state and record a checkpoint marker. The
    /// marker is appended after capture, so it is not part of the
    /// snapshot it points to.
    pub fn checkpoint(&mut self, label: Option<String>) -> String {
        let checkpoint = create_checkpoint(&self.conversation, &self.documents, label.clone(), Map::new());
        let id = checkpoint.id().to_string();
        self.checkpoints.save(checkpoint);
        self.conversation.add_checkpoint_marker(&id, label);
        tracing::info!(id = %id, stored = self.checkpoints.count(), "checkpoint saved");
        id
    }

    /// Restore checkpoint `id`, or the latest one when `id` is `None`.
    /// Returns the id that was restored.
    pub fn rollback(&mut self, id: Option<&str>) -> Result<String> {
        let checkpoint = match id {
            Some(id) => self
                .checkpoints
                .get(id)
                .ok_or_else(|| anyhow!("checkpoint not found: {}", id))?,
            None => match self.checkpoints.get_latest() {
                Some(c) => c,
                None => bail!("no checkpoints to roll back to"),
            },
        }
        .clone();

        restore_checkpoint(&checkpoint, &mut self.conversation, &mut self.documents);
        Ok(checkpoint.id().to_string())
    }

    // ── Persistence ─────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            documents: self.documents.clone(),
            conversation: self.conversation.clone(),
            checkpoints: self.checkpoints.clone(),
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        tracing::info!(path = %path.display(), "session saved");
        Ok(())
    }

    pub fn load_json(config: &Config, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        let snapshot: SessionSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))?;
        Ok(Self::from_snapshot(config, snapshot))
    }
}
