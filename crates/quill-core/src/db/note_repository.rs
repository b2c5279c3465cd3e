//! Note repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::Result;
use crate::models::{FolderId, Note, NoteId};
use libsql::{params, Connection, Row};

use super::parse_id;

const NOTE_COLUMNS: &str = "id, title, content, folder_id, created_at, updated_at";

/// Trait for note storage operations (async)
#[allow(async_fn_in_trait)]
pub trait NoteRepository {
    /// Insert or replace a note exactly as given
    async fn upsert(&self, note: &Note) -> Result<()>;

    /// Get a note by ID
    async fn get(&self, id: &NoteId) -> Result<Option<Note>>;

    /// List notes, most recently updated first
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Note>>;

    /// List notes filed under a folder
    async fn list_in_folder(&self, folder_id: &FolderId) -> Result<Vec<Note>>;

    /// List notes carrying `#tag`
    async fn list_by_tag(&self, tag: &str, limit: usize) -> Result<Vec<Note>>;

    /// Notes whose title or content contains `query`, ignoring ASCII case
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Note>>;

    /// Notes updated after `since` (all when `None`)
    async fn modified_since(&self, since: Option<i64>) -> Result<Vec<Note>>;

    /// Remove a note row. Returns whether it existed.
    async fn delete(&self, id: &NoteId) -> Result<bool>;

    /// Move every note of `folder_id` to the top level, stamping `updated_at`
    async fn detach_folder(&self, folder_id: &FolderId, updated_at: i64) -> Result<u64>;

    async fn count_in_folder(&self, folder_id: &FolderId) -> Result<i64>;
}

/// libSQL implementation of `NoteRepository`
pub struct LibSqlNoteRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlNoteRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_note(row: &Row) -> Result<Note> {
        let id: String = row.get(0)?;
        let folder_id: Option<String> = row.get(3)?;
        Ok(Note {
            id: parse_id(&id)?,
            title: row.get(1)?,
            content: row.get(2)?,
            folder_id: folder_id.as_deref().map(parse_id).transpose()?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    async fn query_notes(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Note>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            notes.push(Self::parse_note(&row)?);
        }
        Ok(notes)
    }
}

impl NoteRepository for LibSqlNoteRepository<'_> {
    async fn upsert(&self, note: &Note) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO notes (id, title, content, folder_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    content = excluded.content,
                    folder_id = excluded.folder_id,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at",
                params![
                    note.id.as_str(),
                    note.title.clone(),
                    note.content.clone(),
                    note.folder_id.map(|id| id.as_str()),
                    note.created_at,
                    note.updated_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1");
        let mut notes = self.query_notes(&sql, params![id.as_str()]).await?;
        Ok(notes.pop())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes ORDER BY updated_at DESC, id LIMIT ?1 OFFSET ?2"
        );
        self.query_notes(&sql, params![limit as i64, offset as i64])
            .await
    }

    async fn list_in_folder(&self, folder_id: &FolderId) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE folder_id = ?1 ORDER BY updated_at DESC, id"
        );
        self.query_notes(&sql, params![folder_id.as_str()]).await
    }

    async fn list_by_tag(&self, tag: &str, limit: usize) -> Result<Vec<Note>> {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if tag.is_empty() {
            return self.list(limit, 0).await;
        }

        // Narrow with LIKE, then confirm against the real tag grammar
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE title LIKE ?1 OR content LIKE ?1
             ORDER BY updated_at DESC, id"
        );
        let pattern = format!("%#{tag}%");
        let notes = self.query_notes(&sql, params![pattern]).await?;
        Ok(notes
            .into_iter()
            .filter(|note| note.tags().contains(&tag))
            .take(limit)
            .collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Note>> {
        let query = query.trim();
        if query.is_empty() {
            return self.list(limit, 0).await;
        }

        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\'
             ORDER BY updated_at DESC, id LIMIT ?2"
        );
        let pattern = format!("%{}%", escape_like(query));
        self.query_notes(&sql, params![pattern, limit as i64]).await
    }

    async fn modified_since(&self, since: Option<i64>) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE updated_at > ?1 ORDER BY updated_at, id"
        );
        self.query_notes(&sql, params![since.unwrap_or(i64::MIN)])
            .await
    }

    async fn delete(&self, id: &NoteId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM notes WHERE id = ?1", params![id.as_str()])
            .await?;
        Ok(rows > 0)
    }

    async fn detach_folder(&self, folder_id: &FolderId, updated_at: i64) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE notes SET folder_id = NULL, updated_at = MAX(updated_at, ?1) WHERE folder_id = ?2",
                params![updated_at, folder_id.as_str()],
            )
            .await?;
        Ok(rows)
    }

    async fn count_in_folder(&self, folder_id: &FolderId) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM notes WHERE folder_id = ?1",
                params![folder_id.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}

/// Make `%`, `_` and the escape character match literally
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
