//! Media metadata repository implementation

use crate::error::Result;
use crate::models::{MediaId, MediaItem};
use libsql::{params, Connection, Row};

use super::parse_id;

const MEDIA_COLUMNS: &str = "id, file_name, mime_type, size_bytes, created_at, updated_at";

/// Trait for media metadata storage operations (async)
#[allow(async_fn_in_trait)]
pub trait MediaRepository {
    async fn upsert(&self, item: &MediaItem) -> Result<()>;

    async fn get(&self, id: &MediaId) -> Result<Option<MediaItem>>;

    /// All media, newest first
    async fn list(&self) -> Result<Vec<MediaItem>>;

    async fn modified_since(&self, since: Option<i64>) -> Result<Vec<MediaItem>>;

    async fn delete(&self, id: &MediaId) -> Result<bool>;
}

/// libSQL implementation of `MediaRepository`
pub struct LibSqlMediaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMediaRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_media(row: &Row) -> Result<MediaItem> {
        let id: String = row.get(0)?;
        Ok(MediaItem {
            id: parse_id(&id)?,
            file_name: row.get(1)?,
            mime_type: row.get(2)?,
            size_bytes: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    async fn query_media(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<MediaItem>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_media(&row)?);
        }
        Ok(items)
    }
}

impl MediaRepository for LibSqlMediaRepository<'_> {
    async fn upsert(&self, item: &MediaItem) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO media (id, file_name, mime_type, size_bytes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    file_name = excluded.file_name,
                    mime_type = excluded.mime_type,
                    size_bytes = excluded.size_bytes,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at",
                params![
                    item.id.as_str(),
                    item.file_name.clone(),
                    item.mime_type.clone(),
                    item.size_bytes,
                    item.created_at,
                    item.updated_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &MediaId) -> Result<Option<MediaItem>> {
        let sql = format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = ?1");
        let mut items = self.query_media(&sql, params![id.as_str()]).await?;
        Ok(items.pop())
    }

    async fn list(&self) -> Result<Vec<MediaItem>> {
        let sql = format!("SELECT {MEDIA_COLUMNS} FROM media ORDER BY created_at DESC, id");
        self.query_media(&sql, ()).await
    }

    async fn modified_since(&self, since: Option<i64>) -> Result<Vec<MediaItem>> {
        let sql = format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE updated_at > ?1 ORDER BY updated_at, id"
        );
        self.query_media(&sql, params![since.unwrap_or(i64::MIN)])
            .await
    }

    async fn delete(&self, id: &MediaId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM media WHERE id = ?1", params![id.as_str()])
            .await?;
        Ok(rows > 0)
    }
}
