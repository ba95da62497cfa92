//! Tool-call boundary between the model and the document state.
//!
//! Every edit the model makes goes through a [`Tool`]: a named operation
//! with an OpenAI function-calling parameter schema and an async
//! [`execute`](Tool::execute) that returns a human-readable result string.
//! Tools never see the conversation or the checkpoint store; they get a
//! [`ToolContext`] that borrows only the live [`DocumentState`] and the
//! content parser.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐  │
//! │  │ reading  │ │ editing  │ │ custom   │  │
//! │  │ chunks   │ │ diff/    │ │ (Rust)   │  │
//! │  │          │ │ lessons  │ │          │  │
//! │  └──────────┘ └──────────┘ └──────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     AuthoringSession::call_tool() → toolCallResult message
//! ```
//!
//! # Built-in tools
//!
//! | Tool | Mutating | Purpose |
//! |------|----------|---------|
//! | `read_first_chunk` | no | Rewind to chunk 1 and return it |
//! | `read_next_chunk` | no | Advance one chunk |
//! | `read_previous_chunk` | no | Step back one chunk |
//! | `apply_diff` | yes | Anchored edit of the document or a section |
//! | `create_lesson` | yes | Append a lesson and select it |
//! | `create_section` | yes | Append a section parsed from Markdown |
//! | `replace_document` | yes | Swap in a whole new document |
//! | `select_lesson` | no | Change the current lesson |
//! | `list_lessons` | no | Course outline |
//!
//! Failures are returned as `Err`; the session turns them into
//! `toolCallResult` messages with `isError: true`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lesson_harness_core::chunk::render_chunk;
use lesson_harness_core::diff::DeleteScope;
use lesson_harness_core::document_state::DocumentState;
use lesson_harness_core::models::{Document, Node};
use lesson_harness_core::validate::{validate_document, validate_value};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::markdown::ContentParser;

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// An operation the model can call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use lesson_harness::tools::{Tool, ToolContext};
///
/// pub struct WordCountTool;
///
/// #[async_trait]
/// impl Tool for WordCountTool {
///     fn name(&self) -> &str { "word_count" }
///     fn description(&self) -> &str { "Count words in the working document" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
///         let words = ctx.document.document().flatten_text().split_whitespace().count();
///         Ok(format!("{} words", words))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, used as the route path
    /// (`POST /tools/{name}`) and the function name the model calls.
    fn name(&self) -> &str;

    /// One-line description for the model.
    fn description(&self) -> &str;

    /// Whether a successful call changes document state. Mutating calls
    /// trigger an automatic checkpoint when that is enabled.
    fn is_mutating(&self) -> bool {
        false
    }

    /// OpenAI function-calling JSON Schema (`type: "object"`,
    /// `properties`, optional `required`).
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` has already passed [`validate_params`] and
    /// carries schema defaults for omitted keys.
    async fn execute(&self, params: Value, ctx: &mut ToolContext<'_>) -> Result<String>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// What a tool may touch while it runs.
pub struct ToolContext<'a> {
    pub document: &'a mut DocumentState,
    pub parser: &'a dyn ContentParser,
    pub delete_scope: DeleteScope,
}

impl<'a> ToolContext<'a> {
    pub fn new(
        document: &'a mut DocumentState,
        parser: &'a dyn ContentParser,
        delete_scope: DeleteScope,
    ) -> Self {
        Self {
            document,
            parser,
            delete_scope,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter validation
// ═══════════════════════════════════════════════════════════════════════

/// Check `params` against a tool's JSON Schema.
///
/// Verifies required keys, top-level JSON types, and `enum` membership,
/// then fills in `default` values for absent properties. A `null` body is
/// treated as `{}`.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => bail!(
            "parameters must be a JSON object, got {}",
            json_type_name(other)
        ),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for req_field in &required {
        if !params_obj.contains_key(*req_field) {
            bail!("missing required parameter: {}", req_field);
        }
    }

    let mut result = params_obj.clone();

    for (prop_name, prop_schema) in &properties {
        match params_obj.get(prop_name) {
            Some(value) => {
                if let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) {
                    let type_ok = match expected_type {
                        "string" => value.is_string(),
                        "integer" => value.is_i64() || value.is_u64(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        "array" => value.is_array(),
                        "object" => value.is_object(),
                        _ => true,
                    };
                    if !type_ok {
                        bail!(
                            "parameter '{}' must be of type '{}', got {}",
                            prop_name,
                            expected_type,
                            json_type_name(value)
                        );
                    }
                }

                if let Some(enum_values) = prop_schema.get("enum").and_then(|e| e.as_array()) {
                    if !enum_values.contains(value) {
                        let allowed: Vec<String> =
                            enum_values.iter().map(|v| v.to_string()).collect();
                        bail!(
                            "parameter '{}' must be one of [{}], got {}",
                            prop_name,
                            allowed.join(", "),
                            value
                        );
                    }
                }
            }
            None => {
                if let Some(default) = prop_schema.get("default") {
                    result.insert(prop_name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A string parameter, with blank strings treated as absent.
fn opt_str<'p>(params: &'p Value, key: &str) -> Option<&'p str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// A diff anchor. Only a missing or empty string is absent; whitespace is a
/// real search string.
fn anchor_str<'p>(params: &'p Value, key: &str) -> Option<&'p str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn required_str<'p>(params: &'p Value, key: &str) -> Result<&'p str> {
    match opt_str(params, key) {
        Some(s) => Ok(s),
        None => bail!("{} must not be empty", key),
    }
}

/// Structurally check raw node JSON, then decode it.
fn decode_nodes(raw: &Value, what: &str) -> Result<Vec<Node>> {
    let wrapped = json!({ "type": "doc", "content": raw });
    let report = validate_value(&wrapped);
    if !report.valid {
        bail!("invalid {}: {}", what, report.summary());
    }
    let doc: Document = serde_json::from_value(wrapped)
        .with_context(|| format!("invalid {}: could not decode nodes", what))?;
    Ok(doc.content)
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

/// Rewind the cursor and return chunk 1.
pub struct ReadFirstChunkTool;

#[async_trait]
impl Tool for ReadFirstChunkTool {
    fn name(&self) -> &str {
        "read_first_chunk"
    }

    fn description(&self) -> &str {
        "Read the first chunk of the working document and move the cursor there"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        match ctx.document.read_first_chunk() {
            Some(chunk) => Ok(render_chunk(chunk)),
            None => bail!("the document has no chunks"),
        }
    }
}

/// Advance the cursor by one chunk.
pub struct ReadNextChunkTool;

#[async_trait]
impl Tool for ReadNextChunkTool {
    fn name(&self) -> &str {
        "read_next_chunk"
    }

    fn description(&self) -> &str {
        "Read the chunk after the current one"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        if let Some(chunk) = ctx.document.read_next_chunk() {
            return Ok(render_chunk(chunk));
        }
        Ok(format!(
            "Already at the last chunk (chunk {} of {}). There is no next chunk.",
            ctx.document.cursor() + 1,
            ctx.document.chunk_count()
        ))
    }
}

/// Step the cursor back by one chunk.
pub struct ReadPreviousChunkTool;

#[async_trait]
impl Tool for ReadPreviousChunkTool {
    fn name(&self) -> &str {
        "read_previous_chunk"
    }

    fn description(&self) -> &str {
        "Read the chunk before the current one"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        if let Some(chunk) = ctx.document.read_previous_chunk() {
            return Ok(render_chunk(chunk));
        }
        Ok(format!(
            "Already at the first chunk (chunk 1 of {}). There is no previous chunk.",
            ctx.document.chunk_count()
        ))
    }
}

/// Anchored, node-granular edit of the working document or of one
/// section's document.
pub struct ApplyDiffTool;

#[async_trait]
impl Tool for ApplyDiffTool {
    fn name(&self) -> &str {
        "apply_diff"
    }

    fn description(&self) -> &str {
        "Insert nodes after the node containing beforeContent (or at the end), \
         optionally deleting nodes containing deleteContent first"
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "beforeContent": {
                    "type": "string",
                    "description": "Text inside the node to insert after. Omit to append."
                },
                "deleteContent": {
                    "type": "string",
                    "description": "Text identifying nodes to remove before inserting"
                },
                "insertContent": {
                    "type": "array",
                    "description": "Nodes to insert",
                    "items": { "type": "object" },
                    "default": []
                },
                "lesson_slug": {
                    "type": "string",
                    "description": "Edit this lesson's section instead of the working document"
                },
                "section_slug": {
                    "type": "string",
                    "description": "Section to edit; requires lesson_slug"
                }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        let before = anchor_str(&params, "beforeContent");
        let delete = anchor_str(&params, "deleteContent");
        let insert = decode_nodes(&params["insertContent"], "insertContent")?;

        let result = match (opt_str(&params, "lesson_slug"), opt_str(&params, "section_slug")) {
            (Some(lesson), Some(section)) => ctx.document.apply_diff_to_section(
                lesson,
                section,
                before,
                delete,
                insert,
                ctx.delete_scope,
            )?,
            (None, None) => ctx
                .document
                .apply_diff(before, delete, insert, ctx.delete_scope),
            _ => bail!("lesson_slug and section_slug must be given together"),
        };

        if !result.success {
            bail!(result.message);
        }
        Ok(result.message)
    }
}

/// Append a lesson to the course and select it.
pub struct CreateLessonTool;

#[async_trait]
impl Tool for CreateLessonTool {
    fn name(&self) -> &str {
        "create_lesson"
    }

    fn description(&self) -> &str {
        "Create a new lesson and make it the current lesson"
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Lesson title" },
                "slug": { "type": "string", "description": "Unique identifier within the course" },
                "description": { "type": "string", "default": "" }
            },
            "required": ["title", "slug"]
        })
    }

    async fn execute(&self, params: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        let title = required_str(&params, "title")?;
        let slug = required_str(&params, "slug")?;
        let description = params["description"].as_str().unwrap_or("");

        let lesson = ctx.document.create_lesson(title, slug, description)?;
        Ok(format!(
            "Created lesson {} \"{}\" ({}). It is now the current lesson.",
            lesson.order_index + 1,
            lesson.title,
            lesson.slug
        ))
    }
}

/// Append a section to a lesson, populated from Markdown.
///
/// A Markdown parse failure still creates the section, empty, and says so
/// in the result.
pub struct CreateSectionTool;

#[async_trait]
impl Tool for CreateSectionTool {
    fn name(&self) -> &str {
        "create_section"
    }

    fn description(&self) -> &str {
        "Create a section in a lesson from Markdown content"
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "lesson_slug": { "type": "string", "description": "Lesson to add the section to" },
                "title": { "type": "string" },
                "slug": { "type": "string", "description": "Unique identifier within the lesson" },
                "content": { "type": "string", "description": "Section body as Markdown", "default": "" }
            },
            "required": ["lesson_slug", "title", "slug"]
        })
    }

    async fn execute(&self, params: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        let lesson_slug = required_str(&params, "lesson_slug")?;
        let title = required_str(&params, "title")?;
        let slug = required_str(&params, "slug")?;
        let content = params["content"].as_str().unwrap_or("");

        let order = ctx
            .document
            .create_section_in_lesson(lesson_slug, title, slug)?
            .order_index;

        let parsed = ctx.parser.parse(content).and_then(|doc| {
            let report = validate_document(&doc);
            if !report.valid {
                bail!("parsed section is not a valid document: {}", report.summary());
            }
            Ok(doc)
        });

        match parsed {
            Ok(doc) => {
                let nodes = doc.len();
                ctx.document.set_section_document(lesson_slug, slug, doc)?;
                Ok(format!(
                    "Created section {} \"{}\" ({}) in lesson {} with {} node(s).",
                    order + 1,
                    title,
                    slug,
                    lesson_slug,
                    nodes
                ))
            }
            Err(e) => {
                tracing::warn!(lesson = lesson_slug, section = slug, error = %e, "section content did not parse");
                Ok(format!(
                    "Created section {} \"{}\" ({}) in lesson {}, but its content could not be parsed ({}). \
                     The section is empty.",
                    order + 1,
                    title,
                    slug,
                    lesson_slug,
                    e
                ))
            }
        }
    }
}

/// Swap the whole working document.
pub struct ReplaceDocumentTool;

#[async_trait]
impl Tool for ReplaceDocumentTool {
    fn name(&self) -> &str {
        "replace_document"
    }

    fn description(&self) -> &str {
        "Replace the entire working document"
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "newDocument": {
                    "type": "object",
                    "description": "A document of the form { \"type\": \"doc\", \"content\": [...] }"
                }
            },
            "required": ["newDocument"]
        })
    }

    async fn execute(&self, params: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        let raw = &params["newDocument"];
        let report = validate_value(raw);
        if !report.valid {
            bail!("invalid newDocument: {}", report.summary());
        }
        let doc: Document =
            serde_json::from_value(raw.clone()).context("invalid newDocument: could not decode")?;

        let nodes = doc.len();
        ctx.document.replace_document(doc);
        Ok(format!(
            "Replaced the document: {} top-level node(s) in {} chunk(s). The cursor is at chunk 1.",
            nodes,
            ctx.document.chunk_count()
        ))
    }
}

/// Make an existing lesson current.
pub struct SelectLessonTool;

#[async_trait]
impl Tool for SelectLessonTool {
    fn name(&self) -> &str {
        "select_lesson"
    }

    fn description(&self) -> &str {
        "Make an existing lesson the current lesson"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": { "type": "string" }
            },
            "required": ["slug"]
        })
    }

    async fn execute(&self, params: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        let slug = required_str(&params, "slug")?;
        let lesson = ctx.document.set_current_lesson_by_slug(slug)?;
        Ok(format!(
            "Lesson \"{}\" ({}) is now current. It has {} section(s).",
            lesson.title,
            lesson.slug,
            lesson.sections.len()
        ))
    }
}

/// Course outline.
pub struct ListLessonsTool;

#[async_trait]
impl Tool for ListLessonsTool {
    fn name(&self) -> &str {
        "list_lessons"
    }

    fn description(&self) -> &str {
        "List lessons and sections in the course"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        Ok(ctx.document.outline())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Tool description as listed by `GET /tools/list` and `lh tools`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub mutating: bool,
    pub parameters: Value,
}

/// Name-addressed set of tools.
///
/// # Example
///
/// ```rust
/// use lesson_harness::tools::ToolRegistry;
///
/// let tools = ToolRegistry::with_builtins();
/// assert!(tools.find("apply_diff").is_some());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry pre-loaded with every built-in tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ReadFirstChunkTool));
        registry.register(Box::new(ReadNextChunkTool));
        registry.register(Box::new(ReadPreviousChunkTool));
        registry.register(Box::new(ApplyDiffTool));
        registry.register(Box::new(CreateLessonTool));
        registry.register(Box::new(CreateSectionTool));
        registry.register(Box::new(ReplaceDocumentTool));
        registry.register(Box::new(SelectLessonTool));
        registry.register(Box::new(ListLessonsTool));
        registry
    }

    /// Register a tool. A tool with the same name replaces the old one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for every registered tool, in registration order.
    pub fn definitions(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                mutating: t.is_mutating(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::MarkdownParser;

    async fn call(registry: &ToolRegistry, state: &mut DocumentState, name: &str, params: Value) -> Result<String> {
        let tool = registry.find(name).unwrap();
        let params = validate_params(&tool.parameters_schema(), &params)?;
        let parser = MarkdownParser;
        let mut ctx = ToolContext::new(state, &parser, DeleteScope::AllMatching);
        tool.execute(params, &mut ctx).await
    }

    fn sample_state() -> DocumentState {
        let mut state = DocumentState::new(10);
        state.initialize(Document::new(vec![
            Node::paragraph("Keep this"),
            Node::paragraph("Delete this"),
            Node::paragraph("Keep this too"),
        ]));
        state
    }

    #[test]
    fn test_validate_params_required_and_defaults() {
        let schema = CreateLessonTool.parameters_schema();
        let err = validate_params(&schema, &json!({ "title": "T" })).unwrap_err();
        assert!(err.to_string().contains("missing required parameter: slug"));

        let ok = validate_params(&schema, &json!({ "title": "T", "slug": "t" })).unwrap();
        assert_eq!(ok["description"], json!(""));
    }

    #[test]
    fn test_validate_params_type_and_enum() {
        let schema = json!({
            "type": "object",
            "properties": {
                "n": { "type": "integer" },
                "mode": { "type": "string", "enum": ["a", "b"] }
            }
        });
        let err = validate_params(&schema, &json!({ "n": "1" })).unwrap_err();
        assert!(err.to_string().contains("must be of type 'integer', got string"));
        let err = validate_params(&schema, &json!({ "mode": "c" })).unwrap_err();
        assert!(err.to_string().contains("must be one of"));
        assert!(validate_params(&schema, &Value::Null).is_ok());
        assert!(validate_params(&schema, &json!([1])).is_err());
    }

    #[test]
    fn test_registry_builtins() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 9);
        let defs = registry.definitions();
        assert_eq!(defs[0].name, "read_first_chunk");
        assert!(defs.iter().find(|d| d.name == "apply_diff").unwrap().mutating);
        assert!(!defs.iter().find(|d| d.name == "list_lessons").unwrap().mutating);
        assert!(registry.find("nope").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::with_builtins();
        registry.register(Box::new(ListLessonsTool));
        assert_eq!(registry.len(), 9);
        assert_eq!(registry.tools().last().unwrap().name(), "list_lessons");
    }

    #[tokio::test]
    async fn test_chunk_navigation() {
        let registry = ToolRegistry::with_builtins();
        let mut state = sample_state();
        assert_eq!(state.chunk_count(), 3);

        let first = call(&registry, &mut state, "read_first_chunk", json!({})).await.unwrap();
        assert!(first.starts_with("Chunk 1 of 3"));
        let prev = call(&registry, &mut state, "read_previous_chunk", json!({})).await.unwrap();
        assert!(prev.contains("no previous chunk"));
        let next = call(&registry, &mut state, "read_next_chunk", json!({})).await.unwrap();
        assert!(next.starts_with("Chunk 2 of 3"));
        call(&registry, &mut state, "read_next_chunk", json!({})).await.unwrap();
        let end = call(&registry, &mut state, "read_next_chunk", json!({})).await.unwrap();
        assert!(end.contains("chunk 3 of 3"));
        assert_eq!(state.cursor(), 2);
    }

    #[tokio::test]
    async fn test_apply_diff_delete_and_insert() {
        let registry = ToolRegistry::with_builtins();
        let mut state = sample_state();
        let msg = call(
            &registry,
            &mut state,
            "apply_diff",
            json!({
                "beforeContent": "Keep this",
                "deleteContent": "Delete this",
                "insertContent": [{ "type": "paragraph", "content": [{ "type": "text", "text": "New" }] }]
            }),
        )
        .await
        .unwrap();
        assert!(msg.starts_with("Deleted"));
        let texts: Vec<String> = state.document().content.iter().map(lesson_harness_core::models::flatten_text).collect();
        assert_eq!(texts, vec!["Keep this", "New", "Keep this too"]);
    }

    #[tokio::test]
    async fn test_apply_diff_missing_anchor_is_error_and_pure() {
        let registry = ToolRegistry::with_builtins();
        let mut state = sample_state();
        let before = state.clone();
        let err = call(&registry, &mut state, "apply_diff", json!({ "beforeContent": "absent" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Could not find beforeContent"));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_apply_diff_rejects_malformed_nodes() {
        let registry = ToolRegistry::with_builtins();
        let mut state = sample_state();
        let before = state.clone();
        let err = call(
            &registry,
            &mut state,
            "apply_diff",
            json!({ "insertContent": [{ "content": [] }] }),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("invalid insertContent"));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_apply_diff_needs_both_slugs() {
        let registry = ToolRegistry::with_builtins();
        let mut state = sample_state();
        let err = call(&registry, &mut state, "apply_diff", json!({ "lesson_slug": "intro" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be given together"));
    }

    #[tokio::test]
    async fn test_lessons_and_sections() {
        let registry = ToolRegistry::with_builtins();
        let mut state = DocumentState::default();

        let msg = call(&registry, &mut state, "create_lesson", json!({ "title": "Intro", "slug": "intro" }))
            .await
            .unwrap();
        assert!(msg.contains("now the current lesson"));
        let err = call(&registry, &mut state, "create_lesson", json!({ "title": "Again", "slug": "intro" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("intro"));

        let msg = call(
            &registry,
            &mut state,
            "create_section",
            json!({ "lesson_slug": "intro", "title": "Basics", "slug": "basics", "content": "# Hi\n\nText" }),
        )
        .await
        .unwrap();
        assert!(msg.contains("with 2 node(s)"));
        assert_eq!(state.lesson("intro").unwrap().section("basics").unwrap().document.len(), 2);

        call(
            &registry,
            &mut state,
            "apply_diff",
            json!({
                "lesson_slug": "intro",
                "section_slug": "basics",
                "insertContent": [{ "type": "paragraph", "content": [{ "type": "text", "text": "More" }] }]
            }),
        )
        .await
        .unwrap();
        assert_eq!(state.lesson("intro").unwrap().section("basics").unwrap().document.len(), 3);
        assert!(state.document().is_empty());

        let outline = call(&registry, &mut state, "list_lessons", json!({})).await.unwrap();
        assert!(outline.contains("1. Intro (intro) [current]"));
    }

    #[tokio::test]
    async fn test_create_section_parse_failure_degrades() {
        let registry = ToolRegistry::with_builtins();
        let mut state = DocumentState::default();
        state.create_lesson("Intro", "intro", "").unwrap();

        let msg = call(
            &registry,
            &mut state,
            "create_section",
            json!({ "lesson_slug": "intro", "title": "Code", "slug": "code", "content": "```\nunclosed" }),
        )
        .await
        .unwrap();
        assert!(msg.contains("could not be parsed"));
        assert!(state.lesson("intro").unwrap().section("code").unwrap().document.is_empty());
    }

    #[tokio::test]
    async fn test_create_section_unknown_lesson() {
        let registry = ToolRegistry::with_builtins();
        let mut state = DocumentState::default();
        let err = call(
            &registry,
            &mut state,
            "create_section",
            json!({ "lesson_slug": "missing", "title": "T", "slug": "t" }),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(state.lessons().is_empty());
    }

    #[tokio::test]
    async fn test_replace_document() {
        let registry = ToolRegistry::with_builtins();
        let mut state = sample_state();
        state.read_next_chunk();

        let msg = call(
            &registry,
            &mut state,
            "replace_document",
            json!({ "newDocument": { "type": "doc", "content": [
                { "type": "heading", "attrs": { "level": 1 }, "content": [{ "type": "text", "text": "Title" }] }
            ] } }),
        )
        .await
        .unwrap();
        assert!(msg.contains("1 top-level node(s)"));
        assert_eq!(state.cursor(), 0);

        let err = call(
            &registry,
            &mut state,
            "replace_document",
            json!({ "newDocument": { "type": "paragraph" } }),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("invalid newDocument"));
        assert_eq!(state.document().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_diff_whitespace_anchor_is_searched() {
        let registry = ToolRegistry::with_builtins();
        let mut state = DocumentState::new(100);
        state.initialize(Document::new(vec![Node::paragraph("Hello world"), Node::paragraph("Tail")]));

        let msg = call(
            &registry,
            &mut state,
            "apply_diff",
            json!({
                "beforeContent": " ",
                "insertContent": [{ "type": "paragraph", "content": [{ "type": "text", "text": "X" }] }]
            }),
        )
        .await
        .unwrap();
        assert!(!msg.starts_with("Appended"), "{}", msg);
        let texts: Vec<String> = state.document().content.iter().map(lesson_harness_core::models::flatten_text).collect();
        assert_eq!(texts, vec!["Hello world", "X", "Tail"]);

        call(&registry, &mut state, "apply_diff", json!({ "deleteContent": " " }))
            .await
            .unwrap();
        let texts: Vec<String> = state.document().content.iter().map(lesson_harness_core::models::flatten_text).collect();
        assert_eq!(texts, vec!["X", "Tail"]);
    }

    #[tokio::test]
    async fn test_replace_document_rejects_nested_doc() {
        let registry = ToolRegistry::with_builtins();
        let mut state = sample_state();
        let before = state.clone();

        let err = call(
            &registry,
            &mut state,
            "replace_document",
            json!({ "newDocument": { "type": "doc", "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "Intro" }] },
                { "type": "doc", "content": [] }
            ] } }),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("nested doc"));
        assert_eq!(state, before);

        // Whatever replace_document accepts stays editable.
        call(
            &registry,
            &mut state,
            "replace_document",
            json!({ "newDocument": { "type": "doc", "content": [
                { "type": "blockquote", "content": [
                    { "type": "paragraph", "content": [{ "type": "text", "text": "Intro" }] }
                ] }
            ] } }),
        )
        .await
        .unwrap();
        call(
            &registry,
            &mut state,
            "apply_diff",
            json!({ "insertContent": [{ "type": "paragraph", "content": [{ "type": "text", "text": "More" }] }] }),
        )
        .await
        .unwrap();
        assert_eq!(state.document().len(), 2);
    }

    struct NestedDocParser;

    impl ContentParser for NestedDocParser {
        fn parse(&self, _markdown: &str) -> Result<Document> {
            Ok(Document::new(vec![Node::element(
                lesson_harness_core::models::NodeKind::Doc,
                vec![],
            )]))
        }
    }

    #[tokio::test]
    async fn test_create_section_invalid_parse_degrades() {
        let registry = ToolRegistry::with_builtins();
        let mut state = DocumentState::default();
        state.create_lesson("Intro", "intro", "").unwrap();

        let tool = registry.find("create_section").unwrap();
        let params = validate_params(
            &tool.parameters_schema(),
            &json!({ "lesson_slug": "intro", "title": "Odd", "slug": "odd", "content": "anything" }),
        )
        .unwrap();
        let parser = NestedDocParser;
        let mut ctx = ToolContext::new(&mut state, &parser, DeleteScope::AllMatching);
        let msg = tool.execute(params, &mut ctx).await.unwrap();

        assert!(msg.contains("could not be parsed"), "{}", msg);
        assert!(msg.contains("nested doc"), "{}", msg);
        assert!(state.lesson("intro").unwrap().section("odd").unwrap().document.is_empty());
    }

    #[tokio::test]
    async fn test_select_lesson() {
        let registry = ToolRegistry::with_builtins();
        let mut state = DocumentState::default();
        state.create_lesson("One", "one", "").unwrap();
        state.create_lesson("Two", "two", "").unwrap();

        call(&registry, &mut state, "select_lesson", json!({ "slug": "one" })).await.unwrap();
        assert_eq!(state.current_lesson().unwrap().slug, "one");
        assert!(call(&registry, &mut state, "select_lesson", json!({ "slug": "three" })).await.is_err());
    }
}
