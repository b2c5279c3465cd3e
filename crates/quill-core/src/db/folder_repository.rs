//! Folder repository implementation

use crate::error::Result;
use crate::models::{Folder, FolderId};
use libsql::{params, Connection, Row};

use super::parse_id;

/// Trait for folder storage operations (async)
#[allow(async_fn_in_trait)]
pub trait FolderRepository {
    /// Insert or replace a folder exactly as given
    async fn upsert(&self, folder: &Folder) -> Result<()>;

    async fn get(&self, id: &FolderId) -> Result<Option<Folder>>;

    /// All folders ordered by name
    async fn list(&self) -> Result<Vec<Folder>>;

    async fn children(&self, parent_id: &FolderId) -> Result<Vec<Folder>>;

    /// Folders updated after `since` (all when `None`)
    async fn modified_since(&self, since: Option<i64>) -> Result<Vec<Folder>>;

    async fn delete(&self, id: &FolderId) -> Result<bool>;

    /// Promote every child of `parent_id` to the top level, stamping `updated_at`
    async fn detach_children(&self, parent_id: &FolderId, updated_at: i64) -> Result<u64>;
}

/// libSQL implementation of `FolderRepository`
pub struct LibSqlFolderRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlFolderRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_folder(row: &Row) -> Result<Folder> {
        let id: String = row.get(0)?;
        let parent_id: Option<String> = row.get(2)?;
        Ok(Folder {
            id: parse_id(&id)?,
            name: row.get(1)?,
            parent_id: parent_id.as_deref().map(parse_id).transpose()?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    async fn query_folders(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Folder>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut folders = Vec::new();
        while let Some(row) = rows.next().await? {
            folders.push(Self::parse_folder(&row)?);
        }
        Ok(folders)
    }
}

impl FolderRepository for LibSqlFolderRepository<'_> {
    async fn upsert(&self, folder: &Folder) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO folders (id, name, parent_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    parent_id = excluded.parent_id,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at",
                params![
                    folder.id.as_str(),
                    folder.name.clone(),
                    folder.parent_id.map(|id| id.as_str()),
                    folder.created_at,
                    folder.updated_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &FolderId) -> Result<Option<Folder>> {
        let mut folders = self
            .query_folders(
                "SELECT id, name, parent_id, created_at, updated_at FROM folders WHERE id = ?1",
                params![id.as_str()],
            )
            .await?;
        Ok(folders.pop())
    }

    async fn list(&self) -> Result<Vec<Folder>> {
        self.query_folders(
            "SELECT id, name, parent_id, created_at, updated_at FROM folders ORDER BY name COLLATE NOCASE, id",
            (),
        )
        .await
    }

    async fn children(&self, parent_id: &FolderId) -> Result<Vec<Folder>> {
        self.query_folders(
            "SELECT id, name, parent_id, created_at, updated_at FROM folders
             WHERE parent_id = ?1 ORDER BY name COLLATE NOCASE, id",
            params![parent_id.as_str()],
        )
        .await
    }

    async fn modified_since(&self, since: Option<i64>) -> Result<Vec<Folder>> {
        self.query_folders(
            "SELECT id, name, parent_id, created_at, updated_at FROM folders
             WHERE updated_at > ?1 ORDER BY updated_at, id",
            params![since.unwrap_or(i64::MIN)],
        )
        .await
    }

    async fn delete(&self, id: &FolderId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM folders WHERE id = ?1", params![id.as_str()])
            .await?;
        Ok(rows > 0)
    }

    async fn detach_children(&self, parent_id: &FolderId, updated_at: i64) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "UPDATE folders SET parent_id = NULL, updated_at = MAX(updated_at, ?1) WHERE parent_id = ?2",
                params![updated_at, parent_id.as_str()],
            )
            .await?;
        Ok(rows)
    }
}
