//! # Lesson Harness
//!
//! State core for an AI agent that writes lessons by calling tools.
//!
//! The model never rewrites a whole document. It pages through the working
//! document in chunks, edits it with text-anchored, node-granular diffs,
//! and builds a Course → Lesson → Section hierarchy. Every call is
//! recorded in a conversation log, and the whole state can be
//! checkpointed and rolled back.
//!
//! ## Architecture
//!
//! ```text
//!   model / orchestrator
//!          │ tool calls
//!          ▼
//! ┌──────────────────┐   ┌──────────────┐
//! │ AuthoringSession │──▶│ ToolRegistry │
//! │  conversation    │   └──────┬───────┘
//! │  checkpoints     │          ▼
//! └────────┬─────────┘   ┌──────────────┐
//!          │             │DocumentState │  (lesson-harness-core)
//!          └────────────▶│ chunks/diffs │
//!                        └──────────────┘
//!          ┌────────────────┴──────────┐
//!          ▼                           ▼
//!     ┌──────────┐               ┌──────────┐
//!     │   CLI    │               │   HTTP   │
//!     │  (lh)    │               │ (axum)   │
//!     └──────────┘               └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lh chunk lesson.json --chunk-size 4000   # how the model would page it
//! lh validate lesson.json                  # structural check
//! lh run script.json --out session.json    # replay a tool-call script
//! lh serve                                 # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`markdown`] | Markdown → document parser boundary |
//! | [`tools`] | Tool trait, registry, built-in tools |
//! | [`session`] | Tool dispatch, conversation log, checkpoints |
//! | [`replay`] | Scripted sessions |
//! | [`server`] | HTTP server |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! The document model, chunker, diff applier and state types live in
//! [`lesson_harness_core`], re-exported here.

pub mod config;
pub mod logging;
pub mod markdown;
pub mod replay;
pub mod server;
pub mod session;
pub mod tools;

pub use lesson_harness_core;
