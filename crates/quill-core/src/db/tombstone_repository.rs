//! Tombstone repository implementation

use crate::error::Result;
use crate::sync::{EntityKind, Tombstone};
use libsql::{params, Connection};

/// Trait for deletion marker storage (async)
#[allow(async_fn_in_trait)]
pub trait TombstoneRepository {
    /// Record a deletion, keeping the latest `deleted_at` per entity
    async fn record(&self, kind: EntityKind, id: &str, deleted_at: i64) -> Result<()>;

    /// Forget a deletion because the entity exists again
    async fn clear(&self, kind: EntityKind, id: &str) -> Result<()>;

    /// Tombstones with `deleted_at` after `since` (all when `None`)
    async fn since(&self, since: Option<i64>) -> Result<Vec<Tombstone>>;

    /// Drop tombstones deleted at or before `cutoff`. Returns the number removed.
    async fn prune(&self, cutoff: i64) -> Result<u64>;
}

/// libSQL implementation of `TombstoneRepository`
pub struct LibSqlTombstoneRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTombstoneRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl TombstoneRepository for LibSqlTombstoneRepository<'_> {
    async fn record(&self, kind: EntityKind, id: &str, deleted_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO tombstones (entity_kind, id, deleted_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(entity_kind, id) DO UPDATE SET
                    deleted_at = MAX(deleted_at, excluded.deleted_at)",
                params![kind.as_str(), id, deleted_at],
            )
            .await?;
        Ok(())
    }

    async fn clear(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM tombstones WHERE entity_kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
            )
            .await?;
        Ok(())
    }

    async fn since(&self, since: Option<i64>) -> Result<Vec<Tombstone>> {
        let mut rows = self
            .conn
            .query(
                "SELECT entity_kind, id, deleted_at FROM tombstones
                 WHERE deleted_at > ?1 ORDER BY deleted_at, id",
                params![since.unwrap_or(i64::MIN)],
            )
            .await?;

        let mut tombstones = Vec::new();
        while let Some(row) = rows.next().await? {
            let kind: String = row.get(0)?;
            tombstones.push(Tombstone {
                entity_kind: kind.parse()?,
                id: row.get(1)?,
                deleted_at: row.get(2)?,
            });
        }
        Ok(tombstones)
    }

    async fn prune(&self, cutoff: i64) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM tombstones WHERE deleted_at <= ?1",
                params![cutoff],
            )
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_keeps_latest_deletion() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlTombstoneRepository::new(db.connection());

        repo.record(EntityKind::Note, "n1", 20).await.unwrap();
        repo.record(EntityKind::Note, "n1", 10).await.unwrap();
        repo.record(EntityKind::Folder, "n1", 15).await.unwrap();

        let all = repo.since(None).await.unwrap();
        assert_eq!(
            all,
            vec![
                Tombstone {
                    entity_kind: EntityKind::Folder,
                    id: "n1".to_string(),
                    deleted_at: 15,
                },
                Tombstone {
                    entity_kind: EntityKind::Note,
                    id: "n1".to_string(),
                    deleted_at: 20,
                },
            ]
        );
        assert_eq!(repo.since(Some(15)).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clear_and_prune() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlTombstoneRepository::new(db.connection());

        repo.record(EntityKind::Media, "m1", 5).await.unwrap();
        repo.record(EntityKind::Media, "m2", 50).await.unwrap();
        repo.record(EntityKind::Note, "n1", 60).await.unwrap();

        repo.clear(EntityKind::Note, "n1").await.unwrap();
        assert_eq!(repo.prune(5).await.unwrap(), 1);

        let remaining = repo.since(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "m2");
    }
}
