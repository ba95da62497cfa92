//! # Lesson Harness CLI (`lh`)
//!
//! Offline access to the document core and a runner for the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! lh --config ./config/lesson.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lh chunk <doc.json>` | Show how a document splits into chunks |
//! | `lh validate <doc.json>` | Structural check; exits non-zero when invalid |
//! | `lh diff <doc.json>` | Apply one anchored edit |
//! | `lh run <script.json>` | Replay a tool-call script against a fresh session |
//! | `lh tools` | Print tool definitions as JSON |
//! | `lh serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Page a large lesson the way the model would
//! lh chunk lesson.json --chunk-size 4000
//!
//! # Insert nodes after the paragraph mentioning "ownership"
//! lh diff lesson.json --before "ownership" --insert nodes.json --out lesson.json
//!
//! # Replay a recorded run and keep the resulting state
//! lh run script.json --out session.json --document-out lesson.json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lesson_harness::config;
use lesson_harness::lesson_harness_core::chunk::chunk_document;
use lesson_harness::lesson_harness_core::diff::{apply_diff_with_scope, DeleteScope};
use lesson_harness::lesson_harness_core::models::{Document, Node};
use lesson_harness::lesson_harness_core::validate::{validate_document, validate_value};
use lesson_harness::{logging, replay, server, session::AuthoringSession, tools::ToolRegistry};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Lesson Harness: chunked reading, anchored diffs and checkpoints for
/// AI lesson authoring.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "lh",
    about = "Lesson Harness: document and agent state core for AI lesson authoring",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lesson.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print chunk boundaries for a document.
    Chunk {
        /// Document JSON (`{ "type": "doc", "content": [...] }`).
        path: PathBuf,

        /// Character budget per chunk. Defaults to `[chunking].chunk_size`.
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Check a document's structure.
    Validate {
        path: PathBuf,
    },

    /// Apply one anchored edit and print or write the result.
    Diff {
        path: PathBuf,

        /// Insert after the node containing this text. Omit to append.
        #[arg(long)]
        before: Option<String>,

        /// Remove nodes containing this text first.
        #[arg(long)]
        delete: Option<String>,

        /// JSON file holding an array of nodes to insert.
        #[arg(long)]
        insert: Option<PathBuf>,

        /// Which nodes `--delete` removes. Defaults to `[diff].delete_scope`.
        #[arg(long, value_enum)]
        scope: Option<ScopeArg>,

        /// Write the edited document here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Replay a tool-call script against a fresh session.
    Run {
        script: PathBuf,

        /// Save the final session (document state, conversation, checkpoints).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Write the final working document.
        #[arg(long)]
        document_out: Option<PathBuf>,
    },

    /// Print tool definitions as JSON.
    Tools,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    AllMatching,
    NearestAfterAnchor,
}

impl From<ScopeArg> for DeleteScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::AllMatching => DeleteScope::AllMatching,
            ScopeArg::NearestAfterAnchor => DeleteScope::NearestAfterAnchor,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Chunk { path, chunk_size } => {
            let doc = read_document(&path)?;
            let size = chunk_size.unwrap_or(cfg.chunking.chunk_size);
            let chunks = chunk_document(&doc, size);
            println!(
                "{} node(s), {} characters, {} chunk(s) at {} characters",
                doc.len(),
                doc.text_len(),
                chunks.len(),
                size
            );
            for c in &chunks {
                println!(
                    "  chunk {}/{}  nodes {}..{}  {} chars  {}",
                    c.index + 1,
                    c.total_chunks,
                    c.start_node_index,
                    c.end_node_index,
                    c.character_count,
                    &c.hash[..12.min(c.hash.len())]
                );
            }
        }
        Commands::Validate { path } => {
            let raw = read_json(&path)?;
            let mut report = validate_value(&raw);
            if report.valid {
                let doc: Document = serde_json::from_value(raw)
                    .with_context(|| format!("Failed to decode document: {}", path.display()))?;
                report = validate_document(&doc);
            }
            if !report.valid {
                for e in &report.errors {
                    println!("  - {}", e);
                }
                bail!("{} is not a valid document", path.display());
            }
            println!("{}: valid", path.display());
        }
        Commands::Diff {
            path,
            before,
            delete,
            insert,
            scope,
            out,
        } => {
            let doc = read_document(&path)?;
            let nodes = match insert {
                Some(p) => read_nodes(&p)?,
                None => Vec::new(),
            };
            let scope = scope.map(DeleteScope::from).unwrap_or(cfg.diff.delete_scope);
            let result =
                apply_diff_with_scope(&doc, before.as_deref(), delete.as_deref(), nodes, scope);
            if !result.success {
                bail!(result.message);
            }
            eprintln!("{}", result.message);
            let json = serde_json::to_string_pretty(&result.document)?;
            match out {
                Some(p) => write_file(&p, &json)?,
                None => println!("{}", json),
            }
        }
        Commands::Run {
            script,
            out,
            document_out,
        } => {
            let steps = replay::load_script(&script)?;
            let mut session = AuthoringSession::new(&cfg);
            let transcript = replay::run_script(&mut session, &steps).await?;
            for entry in &transcript {
                let flag = if entry.is_error { " (error)" } else { "" };
                println!("[{}] {}{}: {}", entry.step, entry.kind, flag, entry.output);
            }
            if let Some(p) = out {
                session.save_json(&p)?;
            }
            if let Some(p) = document_out {
                let json = serde_json::to_string_pretty(session.documents().document())?;
                write_file(&p, &json)?;
            }
        }
        Commands::Tools => {
            let defs = ToolRegistry::with_builtins().definitions();
            println!("{}", serde_json::to_string_pretty(&defs)?);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON: {}", path.display()))
}

/// Read, structurally check, and decode a document file.
fn read_document(path: &Path) -> Result<Document> {
    let raw = read_json(path)?;
    let report = validate_value(&raw);
    if !report.valid {
        bail!("{} is not a valid document: {}", path.display(), report.summary());
    }
    serde_json::from_value(raw).with_context(|| format!("Failed to decode document: {}", path.display()))
}

fn read_nodes(path: &Path) -> Result<Vec<Node>> {
    let raw = read_json(path)?;
    if !raw.is_array() {
        bail!("{} must contain a JSON array of nodes", path.display());
    }
    let wrapped = serde_json::json!({ "type": "doc", "content": raw });
    let report = validate_value(&wrapped);
    if !report.valid {
        bail!("{} holds invalid nodes: {}", path.display(), report.summary());
    }
    let doc: Document = serde_json::from_value(wrapped)
        .with_context(|| format!("Failed to decode nodes: {}", path.display()))?;
    Ok(doc.content)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
