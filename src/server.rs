//! HTTP surface for one authoring session.
//!
//! An orchestrator (or a browser editor) drives the session over JSON:
//! tool calls go through the same [`AuthoringSession::call_tool`] path the
//! CLI replay uses, and checkpoints are created and restored explicitly.
//! The session sits behind a single async mutex, so requests are applied
//! one at a time.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/tools/list` | Tool definitions with parameter schemas |
//! | `POST` | `/tools/{name}` | Call a tool; body is the argument object |
//! | `GET`  | `/document` | Document state: working document, chunks, cursor, lessons |
//! | `GET`  | `/messages` | Conversation log, status and metadata |
//! | `GET`  | `/checkpoints` | Stored checkpoints, oldest first |
//! | `POST` | `/checkpoints` | Take a checkpoint (`{ "label": "..." }` optional) |
//! | `POST` | `/checkpoints/{id}/restore` | Roll back to a checkpoint |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no tool registered with name: foo" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404). A tool that runs
//! and fails is not an HTTP error: the call returns 200 with
//! `"isError": true` in the outcome, exactly as the model would see it.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use lesson_harness_core::checkpoint::CheckpointMetadata;
use lesson_harness_core::conversation::ConversationState;
use lesson_harness_core::document_state::DocumentState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::session::{AuthoringSession, ToolOutcome};
use crate::tools::ToolInfo;

pub type SharedSession = Arc<Mutex<AuthoringSession>>;

/// Bind `[server].bind` and serve a fresh session until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let session = Arc::new(Mutex::new(AuthoringSession::new(config)));
    run_server_with_session(config, session).await
}

/// Like [`run_server`], for a session that was loaded or prepared by the
/// caller.
pub async fn run_server_with_session(config: &Config, session: SharedSession) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    {
        let s = session.lock().await;
        for t in s.tools().tools() {
            tracing::info!(tool = t.name(), mutating = t.is_mutating(), "registered tool");
        }
    }

    let app = build_router(session);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("lesson server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// All routes with permissive CORS, over `session`.
pub fn build_router(session: SharedSession) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/document", get(handle_document))
        .route("/messages", get(handle_messages))
        .route("/checkpoints", get(handle_list_checkpoints).post(handle_create_checkpoint))
        .route("/checkpoints/{id}/restore", post(handle_restore_checkpoint))
        .layer(cors)
        .with_state(session)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Decode an optional JSON body. An empty body is `None`.
fn optional_json<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<Option<T>, AppError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| bad_request(format!("invalid JSON body: {}", e)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(session): State<SharedSession>) -> Json<ToolListResponse> {
    let s = session.lock().await;
    Json(ToolListResponse {
        tools: s.tools().definitions(),
    })
}

// ============ POST /tools/{name} ============

#[derive(Serialize)]
struct ToolCallResponse {
    result: ToolOutcome,
}

/// The request body is the argument object; an empty body means `{}`.
/// Each request gets a fresh call id. Unknown tools are a 404 and are not
/// recorded in the conversation.
async fn handle_tool_call(
    State(session): State<SharedSession>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ToolCallResponse>, AppError> {
    let args: Value = optional_json(&body)?.unwrap_or(Value::Null);

    let mut s = session.lock().await;
    if s.tools().find(&name).is_none() {
        return Err(not_found(format!("no tool registered with name: {}", name)));
    }

    let call_id = format!("http-{}", Uuid::new_v4());
    let outcome = s.call_tool(&name, &call_id, args).await;
    Ok(Json(ToolCallResponse { result: outcome }))
}

// ============ GET /document, GET /messages ============

async fn handle_document(State(session): State<SharedSession>) -> Json<DocumentState> {
    let s = session.lock().await;
    Json(s.documents().clone())
}

async fn handle_messages(State(session): State<SharedSession>) -> Json<ConversationState> {
    let s = session.lock().await;
    Json(s.conversation().clone())
}

// ============ Checkpoints ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckpointSummary {
    id: String,
    timestamp: DateTime<Utc>,
    metadata: CheckpointMetadata,
}

#[derive(Serialize)]
struct CheckpointListResponse {
    checkpoints: Vec<CheckpointSummary>,
}

async fn handle_list_checkpoints(State(session): State<SharedSession>) -> Json<CheckpointListResponse> {
    let s = session.lock().await;
    let checkpoints = s
        .checkpoints()
        .get_all()
        .iter()
        .map(|c| CheckpointSummary {
            id: c.id().to_string(),
            timestamp: c.timestamp(),
            metadata: c.metadata().clone(),
        })
        .collect();
    Json(CheckpointListResponse { checkpoints })
}

#[derive(Deserialize)]
struct CreateCheckpointRequest {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Serialize)]
struct CheckpointIdResponse {
    id: String,
}

async fn handle_create_checkpoint(
    State(session): State<SharedSession>,
    body: Bytes,
) -> Result<Json<CheckpointIdResponse>, AppError> {
    let label = optional_json::<CreateCheckpointRequest>(&body)?.and_then(|r| r.label);
    let mut s = session.lock().await;
    let id = s.checkpoint(label);
    Ok(Json(CheckpointIdResponse { id }))
}

async fn handle_restore_checkpoint(
    State(session): State<SharedSession>,
    Path(id): Path<String>,
) -> Result<Json<CheckpointIdResponse>, AppError> {
    let mut s = session.lock().await;
    let restored = s.rollback(Some(&id)).map_err(|e| not_found(e.to_string()))?;
    Ok(Json(CheckpointIdResponse { id: restored }))
}
