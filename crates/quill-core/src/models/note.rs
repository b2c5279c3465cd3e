//! Note model

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

use super::folder::FolderId;
use super::id::entity_id;

entity_id!(
    /// A unique identifier for a note
    NoteId
);

/// A note in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    /// Title shown in lists
    #[serde(default)]
    pub title: String,
    /// Markdown content
    pub content: String,
    /// Containing folder, `None` for the root
    #[serde(default)]
    pub folder_id: Option<FolderId>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Note {
    /// Create a new note with the given title and content
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: NoteId::new(),
            title: title.into(),
            content: content.into(),
            folder_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Place the note inside a folder
    #[must_use]
    pub const fn in_folder(mut self, folder_id: FolderId) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    /// Extract #tags from title and content
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        let mut tags = extract_tags(&format!("{}\n{}", self.title, self.content));
        tags.sort();
        tags
    }

    /// Title when set, otherwise the first content line, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.content.lines().next().unwrap_or("")
        } else {
            self.title.trim()
        };
        source.chars().take(max_len).collect()
    }

    /// Check if note content is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.content.trim().is_empty()
    }
}

/// Extract #tags from text
///
/// Valid tags match the pattern: `#[a-zA-Z][a-zA-Z0-9_-]*`
/// Tags are returned in lowercase and deduplicated.
///
/// # Examples
///
/// ```
/// use quill_core::models::extract_tags;
///
/// let tags = extract_tags("Hello #world this is #Rust-lang");
/// assert!(tags.contains(&"world".to_string()));
/// assert!(tags.contains(&"rust-lang".to_string()));
/// ```
#[must_use]
pub fn extract_tags(text: &str) -> Vec<String> {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"#([a-zA-Z][a-zA-Z0-9_-]*)").expect("Invalid regex"));
    re.captures_iter(text)
        .map(|cap| cap[1].to_lowercase())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_new() {
        let note = Note::new("Groceries", "Milk and eggs");
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.content, "Milk and eggs");
        assert!(note.folder_id.is_none());
        assert!(note.created_at > 0);
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_tags_cover_title_and_content() {
        let note = Note::new("Plan #Work", "call bob #phone #work");
        assert_eq!(note.tags(), vec!["phone", "work"]);
    }

    #[test]
    fn test_extract_tags_invalid() {
        // Tags starting with numbers are invalid
        let tags = extract_tags("#123 #456test");
        assert!(tags.is_empty());
    }

    #[test]
    fn test_extract_tags_deduplication() {
        let tags = extract_tags("#hello #Hello #HELLO");
        assert_eq!(tags, vec!["hello"]);
    }

    #[test]
    fn test_title_preview_falls_back_to_first_line() {
        let untitled = Note::new("", "First line\nSecond line");
        assert_eq!(untitled.title_preview(50), "First line");
        assert_eq!(untitled.title_preview(5), "First");

        let titled = Note::new("Title", "Body");
        assert_eq!(titled.title_preview(50), "Title");
    }

    #[test]
    fn test_is_empty() {
        assert!(Note::new(" ", "   ").is_empty());
        assert!(!Note::new("", "Hello").is_empty());
    }

    #[test]
    fn test_note_id_serializes_as_plain_string() {
        let id = NoteId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
