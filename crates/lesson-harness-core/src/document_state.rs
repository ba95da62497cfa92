//! Live document state for an authoring agent.
//!
//! [`DocumentState`] owns three things:
//!
//! 1. the canonical working [`Document`],
//! 2. its derived chunk list and a reading cursor, so the agent can page
//!    through the document with `read_first_chunk` / `read_next_chunk` /
//!    `read_previous_chunk`,
//! 3. the Course → Lesson → Section hierarchy, with explicit "current
//!    lesson" and "current section" indices.
//!
//! The struct is plain data: `Clone` is a full structural deep copy and the
//! whole state serializes with serde, which is what checkpoints rely on.
//!
//! Chunks are recomputed in full after every document change. The cursor
//! is reset to 0 when the document is replaced and clamped into range when
//! it is updated, so small edits keep the agent's reading position.

use serde::{Deserialize, Serialize};

use crate::chunk::{rechunk_document, DocumentChunk, DEFAULT_CHUNK_SIZE};
use crate::diff::{apply_diff_with_scope, DeleteScope, DiffResult};
use crate::error::StateError;
use crate::models::{Document, Node};

/// Level 3 of the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSection {
    pub slug: String,
    pub title: String,
    pub order_index: usize,
    pub document: Document,
}

/// Level 2 of the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub order_index: usize,
    pub sections: Vec<LessonSection>,
}

impl Lesson {
    pub fn section(&self, slug: &str) -> Option<&LessonSection> {
        self.sections.iter().find(|s| s.slug == slug)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    document: Document,
    chunks: Vec<DocumentChunk>,
    cursor: usize,
    chunk_size: usize,
    course_title: Option<String>,
    lessons: Vec<Lesson>,
    current_lesson: Option<usize>,
    current_section: Option<usize>,
}

impl Default for DocumentState {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl DocumentState {
    /// Empty state chunked with the given character budget.
    pub fn new(chunk_size: usize) -> Self {
        let document = Document::empty();
        let chunks = rechunk_document(&document, chunk_size);
        Self {
            document,
            chunks,
            cursor: 0,
            chunk_size,
            course_title: None,
            lessons: Vec::new(),
            current_lesson: None,
            current_section: None,
        }
    }

    // ── Document ────────────────────────────────────────────────────

    /// Set the working document and reset the cursor to the first chunk.
    pub fn initialize(&mut self, doc: Document) {
        self.replace_document(doc);
    }

    /// Replace the working document and reset the cursor to the first chunk.
    pub fn replace_document(&mut self, doc: Document) {
        self.document = doc;
        self.chunks = rechunk_document(&self.document, self.chunk_size);
        self.cursor = 0;
        tracing::debug!(chunks = self.chunks.len(), "document replaced");
    }

    /// Set the working document, keeping the cursor where it was unless
    /// the new chunk list is shorter, in which case it moves to the last
    /// chunk.
    pub fn update_document(&mut self, doc: Document) {
        self.document = doc;
        self.chunks = rechunk_document(&self.document, self.chunk_size);
        self.cursor = self.cursor.min(self.chunks.len().saturating_sub(1));
        tracing::debug!(
            chunks = self.chunks.len(),
            cursor = self.cursor,
            "document updated"
        );
    }

    /// Apply an anchored edit to the working document. The document is only
    /// updated when the edit succeeds.
    pub fn apply_diff(
        &mut self,
        before_content: Option<&str>,
        delete_content: Option<&str>,
        insert_nodes: Vec<Node>,
        scope: DeleteScope,
    ) -> DiffResult {
        let result = apply_diff_with_scope(
            &self.document,
            before_content,
            delete_content,
            insert_nodes,
            scope,
        );
        if result.success {
            self.update_document(result.document.clone());
        }
        result
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Change the chunk budget and re-partition, clamping the cursor.
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size;
        let doc = std::mem::take(&mut self.document);
        self.update_document(doc);
    }

    // ── Chunk cursor ────────────────────────────────────────────────

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor to chunk 0 and return it.
    pub fn read_first_chunk(&mut self) -> Option<&DocumentChunk> {
        self.cursor = 0;
        self.chunks.first()
    }

    /// Advance the cursor. Returns `None` and leaves the cursor in place
    /// when already at the last chunk.
    pub fn read_next_chunk(&mut self) -> Option<&DocumentChunk> {
        if self.cursor + 1 >= self.chunks.len() {
            return None;
        }
        self.cursor += 1;
        self.chunks.get(self.cursor)
    }

    /// Step the cursor back. Returns `None` and leaves the cursor in place
    /// when already at the first chunk.
    pub fn read_previous_chunk(&mut self) -> Option<&DocumentChunk> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.chunks.get(self.cursor)
    }

    /// Chunk under the cursor, without moving it.
    pub fn current_chunk(&self) -> Option<&DocumentChunk> {
        self.chunks.get(self.cursor)
    }

    // ── Hierarchy ───────────────────────────────────────────────────

    pub fn course_title(&self) -> Option<&str> {
        self.course_title.as_deref()
    }

    pub fn set_course_title(&mut self, title: impl Into<String>) {
        self.course_title = Some(title.into());
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    pub fn lesson(&self, slug: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.slug == slug)
    }

    pub fn current_lesson(&self) -> Option<&Lesson> {
        self.current_lesson.and_then(|i| self.lessons.get(i))
    }

    pub fn current_section(&self) -> Option<&LessonSection> {
        let lesson = self.current_lesson()?;
        self.current_section.and_then(|i| lesson.sections.get(i))
    }

    /// Append a lesson and make it current.
    pub fn create_lesson(
        &mut self,
        title: &str,
        slug: &str,
        description: &str,
    ) -> Result<&Lesson, StateError> {
        if self.lesson(slug).is_some() {
            return Err(StateError::DuplicateLessonSlug(slug.to_string()));
        }
        let index = self.lessons.len();
        self.lessons.push(Lesson {
            slug: slug.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            order_index: index,
            sections: Vec::new(),
        });
        self.current_lesson = Some(index);
        self.current_section = None;
        tracing::debug!(slug, index, "lesson created");
        Ok(&self.lessons[index])
    }

    /// Make an existing lesson current. The current section is cleared.
    pub fn set_current_lesson_by_slug(&mut self, slug: &str) -> Result<&Lesson, StateError> {
        let index = self
            .lesson_index(slug)
            .ok_or_else(|| StateError::LessonNotFound(slug.to_string()))?;
        self.current_lesson = Some(index);
        self.current_section = None;
        Ok(&self.lessons[index])
    }

    /// Append an empty section to the current lesson and make it current.
    pub fn create_section(&mut self, title: &str, slug: &str) -> Result<&LessonSection, StateError> {
        let lesson_index = self.current_lesson.ok_or(StateError::NoCurrentLesson)?;
        self.push_section(lesson_index, title, slug)
    }

    /// Select `lesson_slug` and append an empty section to it. Nothing
    /// changes, including the current-lesson pointer, if either the lesson
    /// is unknown or the section slug is taken.
    pub fn create_section_in_lesson(
        &mut self,
        lesson_slug: &str,
        title: &str,
        slug: &str,
    ) -> Result<&LessonSection, StateError> {
        let lesson_index = self
            .lesson_index(lesson_slug)
            .ok_or_else(|| StateError::LessonNotFound(lesson_slug.to_string()))?;
        self.push_section(lesson_index, title, slug)
    }

    /// Replace a section's document.
    pub fn set_section_document(
        &mut self,
        lesson_slug: &str,
        section_slug: &str,
        doc: Document,
    ) -> Result<(), StateError> {
        let section = self.section_mut(lesson_slug, section_slug)?;
        section.document = doc;
        Ok(())
    }

    /// Apply an anchored edit scoped to one section's document.
    pub fn apply_diff_to_section(
        &mut self,
        lesson_slug: &str,
        section_slug: &str,
        before_content: Option<&str>,
        delete_content: Option<&str>,
        insert_nodes: Vec<Node>,
        scope: DeleteScope,
    ) -> Result<DiffResult, StateError> {
        let section = self.section_mut(lesson_slug, section_slug)?;
        let result = apply_diff_with_scope(
            &section.document,
            before_content,
            delete_content,
            insert_nodes,
            scope,
        );
        if result.success {
            section.document = result.document.clone();
        }
        Ok(result)
    }

    /// Human-readable outline of the course.
    pub fn outline(&self) -> String {
        let mut out = format!(
            "Course: {}\n",
            self.course_title.as_deref().unwrap_or("(untitled)")
        );
        if self.lessons.is_empty() {
            out.push_str("(no lessons yet)\n");
            return out;
        }
        for (li, lesson) in self.lessons.iter().enumerate() {
            let marker = if self.current_lesson == Some(li) { " [current]" } else { "" };
            out.push_str(&format!(
                "{}. {} ({}){}\n",
                li + 1,
                lesson.title,
                lesson.slug,
                marker
            ));
            for (si, section) in lesson.sections.iter().enumerate() {
                let marker = if self.current_lesson == Some(li) && self.current_section == Some(si) {
                    " [current]"
                } else {
                    ""
                };
                out.push_str(&format!(
                    "   {}.{} {} ({}) · {} node(s){}\n",
                    li + 1,
                    si + 1,
                    section.title,
                    section.slug,
                    section.document.len(),
                    marker
                ));
            }
        }
        out
    }

    fn lesson_index(&self, slug: &str) -> Option<usize> {
        self.lessons.iter().position(|l| l.slug == slug)
    }

    fn push_section(
        &mut self,
        lesson_index: usize,
        title: &str,
        slug: &str,
    ) -> Result<&LessonSection, StateError> {
        let lesson = &mut self.lessons[lesson_index];
        if lesson.section(slug).is_some() {
            return Err(StateError::DuplicateSectionSlug {
                lesson: lesson.slug.clone(),
                section: slug.to_string(),
            });
        }
        let index = lesson.sections.len();
        lesson.sections.push(LessonSection {
            slug: slug.to_string(),
            title: title.to_string(),
            order_index: index,
            document: Document::empty(),
        });
        tracing::debug!(lesson = %lesson.slug, section = slug, index, "section created");
        self.current_lesson = Some(lesson_index);
        self.current_section = Some(index);
        Ok(&self.lessons[lesson_index].sections[index])
    }

    fn section_mut(
        &mut self,
        lesson_slug: &str,
        section_slug: &str,
    ) -> Result<&mut LessonSection, StateError> {
        let lesson = self
            .lessons
            .iter_mut()
            .find(|l| l.slug == lesson_slug)
            .ok_or_else(|| StateError::LessonNotFound(lesson_slug.to_string()))?;
        lesson
            .sections
            .iter_mut()
            .find(|s| s.slug == section_slug)
            .ok_or_else(|| StateError::SectionNotFound {
                lesson: lesson_slug.to_string(),
                section: section_slug.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraphs(n: usize) -> Document {
        Document::new((0..n).map(|i| Node::paragraph(format!("p{:02}", i))).collect())
    }

    #[test]
    fn test_new_state_has_one_empty_chunk() {
        let state = DocumentState::default();
        assert_eq!(state.chunk_count(), 1);
        assert_eq!(state.cursor(), 0);
        assert_eq!(state.current_chunk().map(|c| c.character_count), Some(0));
    }

    #[test]
    fn test_navigation_stops_at_boundaries() {
        let mut state = DocumentState::new(3);
        state.initialize(paragraphs(3));
        assert_eq!(state.chunk_count(), 3);

        assert!(state.read_previous_chunk().is_none());
        assert_eq!(state.cursor(), 0);
        assert_eq!(state.read_next_chunk().map(|c| c.index), Some(1));
        assert_eq!(state.read_next_chunk().map(|c| c.index), Some(2));
        assert!(state.read_next_chunk().is_none());
        assert_eq!(state.cursor(), 2);
        assert_eq!(state.read_previous_chunk().map(|c| c.index), Some(1));
        assert_eq!(state.read_first_chunk().map(|c| c.index), Some(0));
        assert_eq!(state.current_chunk().map(|c| c.index), Some(0));
    }

    #[test]
    fn test_replace_resets_cursor() {
        let mut state = DocumentState::new(3);
        state.initialize(paragraphs(4));
        state.read_next_chunk();
        state.read_next_chunk();
        state.replace_document(paragraphs(4));
        assert_eq!(state.cursor(), 0);
    }

    #[test]
    fn test_update_preserves_cursor() {
        let mut state = DocumentState::new(3);
        state.initialize(paragraphs(4));
        state.read_next_chunk();
        state.read_next_chunk();
        state.update_document(paragraphs(5));
        assert_eq!(state.cursor(), 2);
    }

    #[test]
    fn test_update_clamps_cursor_when_shrinking() {
        let mut state = DocumentState::new(3);
        state.initialize(paragraphs(5));
        for _ in 0..4 {
            state.read_next_chunk();
        }
        assert_eq!(state.cursor(), 4);
        state.update_document(paragraphs(2));
        assert_eq!(state.cursor(), 1);
        state.update_document(Document::empty());
        assert_eq!(state.cursor(), 0);
    }

    #[test]
    fn test_apply_diff_updates_only_on_success() {
        let mut state = DocumentState::default();
        state.initialize(paragraphs(2));
        let failed = state.apply_diff(Some("nope"), None, vec![Node::paragraph("x")], DeleteScope::AllMatching);
        assert!(!failed.success);
        assert_eq!(state.document().len(), 2);

        let ok = state.apply_diff(Some("p00"), None, vec![Node::paragraph("x")], DeleteScope::AllMatching);
        assert!(ok.success);
        assert_eq!(state.document().len(), 3);
        assert_eq!(state.document().content[1], Node::paragraph("x"));
    }

    #[test]
    fn test_create_lesson_and_sections() {
        let mut state = DocumentState::default();
        state.create_lesson("Intro", "intro", "Getting started").unwrap();
        state.create_section("Welcome", "welcome").unwrap();
        state.create_section("Setup", "setup").unwrap();

        let lesson = state.current_lesson().unwrap();
        assert_eq!(lesson.sections.len(), 2);
        assert_eq!(lesson.sections[1].order_index, 1);
        assert_eq!(state.current_section().unwrap().slug, "setup");
    }

    #[test]
    fn test_section_requires_current_lesson() {
        let mut state = DocumentState::default();
        let err = state.create_section("Orphan", "orphan").unwrap_err();
        assert_eq!(err, StateError::NoCurrentLesson);
        assert!(state.lessons().is_empty());
    }

    #[test]
    fn test_duplicate_slugs_rejected_without_change() {
        let mut state = DocumentState::default();
        state.create_lesson("A", "a", "").unwrap();
        state.create_section("S", "s").unwrap();
        state.create_lesson("B", "b", "").unwrap();

        assert_eq!(
            state.create_lesson("A again", "a", "").unwrap_err(),
            StateError::DuplicateLessonSlug("a".to_string())
        );
        assert_eq!(state.current_lesson().unwrap().slug, "b");

        let before = state.clone();
        let err = state.create_section_in_lesson("a", "S again", "s").unwrap_err();
        assert!(matches!(err, StateError::DuplicateSectionSlug { .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_set_current_lesson_by_slug() {
        let mut state = DocumentState::default();
        state.create_lesson("A", "a", "").unwrap();
        state.create_lesson("B", "b", "").unwrap();
        state.set_current_lesson_by_slug("a").unwrap();
        state.create_section("In A", "in-a").unwrap();
        assert_eq!(state.lesson("a").unwrap().sections.len(), 1);
        assert!(state.lesson("b").unwrap().sections.is_empty());
        assert_eq!(
            state.set_current_lesson_by_slug("zzz").unwrap_err(),
            StateError::LessonNotFound("zzz".to_string())
        );
        assert_eq!(state.current_lesson().unwrap().slug, "a");
    }

    #[test]
    fn test_section_scoped_diff() {
        let mut state = DocumentState::default();
        state.create_lesson("A", "a", "").unwrap();
        state.create_section("S", "s").unwrap();
        let result = state
            .apply_diff_to_section("a", "s", None, None, vec![Node::paragraph("hello")], DeleteScope::AllMatching)
            .unwrap();
        assert!(result.success);
        assert_eq!(state.current_section().unwrap().document.len(), 1);
        assert!(state.document().is_empty());
        assert!(state
            .apply_diff_to_section("a", "missing", None, None, vec![], DeleteScope::AllMatching)
            .is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut state = DocumentState::default();
        state.initialize(paragraphs(2));
        state.create_lesson("A", "a", "").unwrap();
        let snapshot = state.clone();

        state.update_document(paragraphs(5));
        state.create_section("S", "s").unwrap();

        assert_eq!(snapshot.document().len(), 2);
        assert!(snapshot.lesson("a").unwrap().sections.is_empty());
    }

    #[test]
    fn test_outline_marks_current() {
        let mut state = DocumentState::default();
        state.set_course_title("Rust 101");
        state.create_lesson("Ownership", "ownership", "").unwrap();
        state.create_section("Moves", "moves").unwrap();
        let outline = state.outline();
        assert!(outline.starts_with("Course: Rust 101\n"));
        assert!(outline.contains("1. Ownership (ownership) [current]"));
        assert!(outline.contains("1.1 Moves (moves) · 0 node(s) [current]"));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut state = DocumentState::new(4);
        state.initialize(paragraphs(3));
        state.create_lesson("A", "a", "desc").unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let restored: DocumentState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
