//! Typed errors for the core crate.
//!
//! Anchor misses and structural validation problems are reported as
//! values ([`DiffResult`](crate::diff::DiffResult),
//! [`ValidationReport`](crate::validate::ValidationReport)); only wire
//! decoding and hierarchy preconditions surface as errors.

use thiserror::Error;

/// Errors raised while decoding the `{ type, attrs?, content? }` wire shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("root node type must be \"doc\", found \"{0}\"")]
    NotADocument(String),

    #[error("text node is missing a `text` string")]
    MissingText,

    #[error("node type must not be empty")]
    EmptyType,
}

/// Precondition violations on the Course → Lesson → Section hierarchy.
///
/// Every variant leaves the [`DocumentState`](crate::document_state::DocumentState)
/// untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("no current lesson: create or select a lesson before adding sections")]
    NoCurrentLesson,

    #[error("a lesson with slug '{0}' already exists")]
    DuplicateLessonSlug(String),

    #[error("lesson '{lesson}' already has a section with slug '{section}'")]
    DuplicateSectionSlug { lesson: String, section: String },

    #[error("no lesson with slug '{0}'")]
    LessonNotFound(String),

    #[error("lesson '{lesson}' has no section with slug '{section}'")]
    SectionNotFound { lesson: String, section: String },
}
