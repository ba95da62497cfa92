//! Conversation log and agent status.
//!
//! The log is append-only: entries are pushed in order and never edited.
//! [`ConversationState::get_messages_for_ai`] projects it into the flat
//! `{ role, content }` shape an LLM call expects. Tool-call entries are
//! left out of that projection (the calling layer rebuilds them from its
//! own request) and checkpoint markers are never shown to the model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the agent is doing right now.
///
/// Any status may be set at any time; the orchestrator owns transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentStatus {
    /// No request in flight.
    #[default]
    Idle,
    /// A model request is in flight.
    Loading,
    /// Paused until a proposed tool call is approved externally.
    ReviewingToolCall,
    /// The last run failed.
    Error,
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ChatMessage {
    User {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Ai {
        content: String,
        timestamp: DateTime<Utc>,
    },
    ToolCall {
        tool_name: String,
        tool_call_id: String,
        arguments: Value,
        timestamp: DateTime<Utc>,
    },
    ToolCallResult {
        tool_name: String,
        tool_call_id: String,
        result: String,
        is_error: bool,
        timestamp: DateTime<Utc>,
    },
    Checkpoint {
        checkpoint_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl ChatMessage {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChatMessage::User { timestamp, .. }
            | ChatMessage::Ai { timestamp, .. }
            | ChatMessage::ToolCall { timestamp, .. }
            | ChatMessage::ToolCallResult { timestamp, .. }
            | ChatMessage::Checkpoint { timestamp, .. } => *timestamp,
        }
    }

    /// Wire tag of the variant (`"user"`, `"toolCallResult"`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            ChatMessage::User { .. } => "user",
            ChatMessage::Ai { .. } => "ai",
            ChatMessage::ToolCall { .. } => "toolCall",
            ChatMessage::ToolCallResult { .. } => "toolCallResult",
            ChatMessage::Checkpoint { .. } => "checkpoint",
        }
    }
}

/// Role of a message sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiRole {
    User,
    Assistant,
    Tool,
}

/// Flat message shape for a model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    pub role: AiRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
    status: AgentStatus,
    metadata: Map<String, Value>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the log.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::User {
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn add_ai_message(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::Ai {
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn add_tool_call(&mut self, tool_name: &str, tool_call_id: &str, arguments: Value) {
        self.push(ChatMessage::ToolCall {
            tool_name: tool_name.to_string(),
            tool_call_id: tool_call_id.to_string(),
            arguments,
            timestamp: Utc::now(),
        });
    }

    pub fn add_tool_result(
        &mut self,
        tool_name: &str,
        tool_call_id: &str,
        result: impl Into<String>,
        is_error: bool,
    ) {
        self.push(ChatMessage::ToolCallResult {
            tool_name: tool_name.to_string(),
            tool_call_id: tool_call_id.to_string(),
            result: result.into(),
            is_error,
            timestamp: Utc::now(),
        });
    }

    pub fn add_checkpoint_marker(&mut self, checkpoint_id: &str, label: Option<String>) {
        self.push(ChatMessage::Checkpoint {
            checkpoint_id: checkpoint_id.to_string(),
            label,
            timestamp: Utc::now(),
        });
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        if self.status != status {
            tracing::debug!(from = ?self.status, to = ?status, "agent status changed");
        }
        self.status = status;
    }

    /// Project the log into model messages.
    ///
    /// `user` → `user`, `ai` → `assistant`, `toolCallResult` → `tool`;
    /// `toolCall` and `checkpoint` entries are omitted.
    pub fn get_messages_for_ai(&self) -> Vec<AiMessage> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                ChatMessage::User { content, .. } => Some(AiMessage {
                    role: AiRole::User,
                    content: content.clone(),
                    tool_call_id: None,
                }),
                ChatMessage::Ai { content, .. } => Some(AiMessage {
                    role: AiRole::Assistant,
                    content: content.clone(),
                    tool_call_id: None,
                }),
                ChatMessage::ToolCallResult {
                    result,
                    tool_call_id,
                    ..
                } => Some(AiMessage {
                    role: AiRole::Tool,
                    content: result.clone(),
                    tool_call_id: Some(tool_call_id.clone()),
                }),
                ChatMessage::ToolCall { .. } | ChatMessage::Checkpoint { .. } => None,
            })
            .collect()
    }

    // ── Metadata side-channel ───────────────────────────────────────

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn remove_metadata(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    /// Overwrite the log and metadata from a snapshot and go idle.
    pub(crate) fn restore(&mut self, messages: Vec<ChatMessage>, metadata: Map<String, Value>) {
        self.messages = messages;
        self.metadata = metadata;
        self.set_status(AgentStatus::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_is_ordered() {
        let mut conv = ConversationState::new();
        conv.add_user_message("hi");
        conv.add_ai_message("hello");
        conv.add_tool_call("read_first_chunk", "call-1", json!({}));
        conv.add_tool_result("read_first_chunk", "call-1", "Chunk 1 of 1", false);
        let kinds: Vec<&str> = conv.messages().iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, vec!["user", "ai", "toolCall", "toolCallResult"]);
        assert_eq!(conv.len(), 4);
    }

    #[test]
    fn test_projection_for_ai() {
        let mut conv = ConversationState::new();
        conv.add_user_message("write a lesson");
        conv.add_tool_call("create_lesson", "call-1", json!({ "title": "A" }));
        conv.add_tool_result("create_lesson", "call-1", "Created lesson", false);
        conv.add_checkpoint_marker("cp-1", None);
        conv.add_ai_message("done");

        let projected = conv.get_messages_for_ai();
        assert_eq!(projected.len(), 3);
        assert_eq!(projected[0].role, AiRole::User);
        assert_eq!(projected[1].role, AiRole::Tool);
        assert_eq!(projected[1].tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(projected[2].role, AiRole::Assistant);
        assert_eq!(projected[2].content, "done");
    }

    #[test]
    fn test_status_can_be_set_freely() {
        let mut conv = ConversationState::new();
        assert_eq!(conv.status(), AgentStatus::Idle);
        conv.set_status(AgentStatus::Error);
        conv.set_status(AgentStatus::ReviewingToolCall);
        assert_eq!(conv.status(), AgentStatus::ReviewingToolCall);
    }

    #[test]
    fn test_metadata_side_channel() {
        let mut conv = ConversationState::new();
        conv.set_metadata("plan", json!({ "lessons": ["intro", "ownership"] }));
        assert_eq!(conv.get_metadata("plan").unwrap()["lessons"][1], "ownership");
        assert!(conv.remove_metadata("plan").is_some());
        assert!(conv.metadata().is_empty());
    }

    #[test]
    fn test_wire_shape() {
        let mut conv = ConversationState::new();
        conv.add_tool_result("apply_diff", "call-9", "Could not find", true);
        let value = serde_json::to_value(&conv.messages()[0]).unwrap();
        assert_eq!(value["type"], "toolCallResult");
        assert_eq!(value["toolName"], "apply_diff");
        assert_eq!(value["toolCallId"], "call-9");
        assert_eq!(value["isError"], true);
        assert!(value["timestamp"].is_string());

        let status = serde_json::to_value(AgentStatus::ReviewingToolCall).unwrap();
        assert_eq!(status, json!("reviewingToolCall"));
    }
}
