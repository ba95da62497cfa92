//! Scripted sessions.
//!
//! A script is a JSON array of steps replayed against an
//! [`AuthoringSession`] in order. It stands in for a model during tests
//! and for reproducing a recorded run:
//!
//! ```json
//! [
//!   { "type": "user", "content": "Write an intro lesson" },
//!   { "type": "tool", "name": "create_lesson", "args": { "title": "Intro", "slug": "intro" } },
//!   { "type": "checkpoint", "label": "lesson created" },
//!   { "type": "rollback" },
//!   { "type": "status", "status": "idle" }
//! ]
//! ```
//!
//! Tool failures are recorded in the transcript and do not stop the
//! replay. A rollback with nothing to roll back to does.

use anyhow::{Context, Result};
use lesson_harness_core::conversation::AgentStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::session::AuthoringSession;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", deny_unknown_fields)]
pub enum Step {
    User {
        content: String,
    },
    Ai {
        content: String,
    },
    Tool {
        name: String,
        /// Generated as `call-{n}` when omitted.
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        args: Value,
    },
    Checkpoint {
        #[serde(default)]
        label: Option<String>,
    },
    /// Restore `id`, or the latest checkpoint.
    Rollback {
        #[serde(default)]
        id: Option<String>,
    },
    Status {
        status: AgentStatus,
    },
}

/// One line of replay output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub step: usize,
    pub kind: String,
    pub output: String,
    pub is_error: bool,
}

pub fn load_script(path: &Path) -> Result<Vec<Step>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    parse_script(&content).with_context(|| format!("Failed to parse script: {}", path.display()))
}

pub fn parse_script(content: &str) -> Result<Vec<Step>> {
    Ok(serde_json::from_str(content)?)
}

/// Replay `steps` against `session`.
pub async fn run_script(session: &mut AuthoringSession, steps: &[Step]) -> Result<Vec<TranscriptEntry>> {
    let mut transcript = Vec::with_capacity(steps.len());
    let mut tool_calls = 0usize;

    for (i, step) in steps.iter().enumerate() {
        let n = i + 1;
        let entry = match step {
            Step::User { content } => {
                session.add_user_message(content.clone());
                entry(n, "user", content.clone(), false)
            }
            Step::Ai { content } => {
                session.add_ai_message(content.clone());
                entry(n, "ai", content.clone(), false)
            }
            Step::Tool { name, id, args } => {
                tool_calls += 1;
                let call_id = id.clone().unwrap_or_else(|| format!("call-{}", tool_calls));
                let outcome = session.call_tool(name, &call_id, args.clone()).await;
                entry(n, &format!("tool:{}", name), outcome.result, outcome.is_error)
            }
            Step::Checkpoint { label } => {
                let id = session.checkpoint(label.clone());
                entry(n, "checkpoint", id, false)
            }
            Step::Rollback { id } => {
                let restored = session
                    .rollback(id.as_deref())
                    .with_context(|| format!("step {}: rollback failed", n))?;
                entry(n, "rollback", restored, false)
            }
            Step::Status { status } => {
                session.set_status(*status);
                entry(n, "status", format!("{:?}", status), false)
            }
        };
        tracing::debug!(step = n, kind = %entry.kind, is_error = entry.is_error, "replayed step");
        transcript.push(entry);
    }

    Ok(transcript)
}

fn entry(step: usize, kind: &str, output: String, is_error: bool) -> TranscriptEntry {
    TranscriptEntry {
        step,
        kind: kind.to_string(),
        output,
        is_error,
    }
}
