//! Sync checkpoint and conflict log repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::ConflictLogEntry;
use crate::sync::SyncConflict;
use libsql::{params, Connection, Row};

/// Trait for per-profile sync bookkeeping (async)
#[allow(async_fn_in_trait)]
pub trait SyncStateRepository {
    /// Last successful sync per profile id
    async fn checkpoints(&self) -> Result<HashMap<String, i64>>;

    async fn save_checkpoint(&self, profile_id: &str, timestamp: i64) -> Result<()>;

    /// Forget a profile's checkpoint so its next session re-diffs everything
    async fn clear_checkpoint(&self, profile_id: &str) -> Result<bool>;

    async fn append_conflicts(
        &self,
        profile_id: &str,
        conflicts: &[SyncConflict],
        resolved_at: i64,
    ) -> Result<()>;

    /// Most recent conflicts first
    async fn list_conflicts(&self, limit: usize) -> Result<Vec<ConflictLogEntry>>;
}

/// libSQL implementation of `SyncStateRepository`
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &Row) -> Result<ConflictLogEntry> {
        Ok(ConflictLogEntry {
            id: row.get(0)?,
            profile_id: row.get(1)?,
            entity_kind: row.get::<String>(2)?.parse()?,
            entity_id: row.get(3)?,
            conflict_kind: parse_label(&row.get::<String>(4)?)?,
            local_change: parse_label(&row.get::<String>(5)?)?,
            remote_change: parse_label(&row.get::<String>(6)?)?,
            local_timestamp: row.get(7)?,
            remote_timestamp: row.get(8)?,
            resolution: parse_label(&row.get::<String>(9)?)?,
            resolved_at: row.get(10)?,
        })
    }
}

/// Parse a snake_case enum label stored as text
fn parse_label<T: DeserializeOwned>(label: &str) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(
        label.to_string(),
    ))?)
}

impl SyncStateRepository for LibSqlSyncStateRepository<'_> {
    async fn checkpoints(&self) -> Result<HashMap<String, i64>> {
        let mut rows = self
            .conn
            .query("SELECT profile_id, last_sync_at FROM sync_checkpoints", ())
            .await?;

        let mut checkpoints = HashMap::new();
        while let Some(row) = rows.next().await? {
            checkpoints.insert(row.get::<String>(0)?, row.get::<i64>(1)?);
        }
        Ok(checkpoints)
    }

    async fn save_checkpoint(&self, profile_id: &str, timestamp: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_checkpoints (profile_id, last_sync_at) VALUES (?1, ?2)
                 ON CONFLICT(profile_id) DO UPDATE SET last_sync_at = excluded.last_sync_at",
                params![profile_id, timestamp],
            )
            .await?;
        Ok(())
    }

    async fn clear_checkpoint(&self, profile_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM sync_checkpoints WHERE profile_id = ?1",
                params![profile_id],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn append_conflicts(
        &self,
        profile_id: &str,
        conflicts: &[SyncConflict],
        resolved_at: i64,
    ) -> Result<()> {
        for conflict in conflicts {
            self.conn
                .execute(
                    "INSERT INTO sync_conflicts (
                        profile_id, entity_kind, entity_id, conflict_kind,
                        local_change, remote_change, local_timestamp, remote_timestamp,
                        resolution, resolved_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        profile_id,
                        conflict.local.entity_kind().as_str(),
                        conflict.local.id(),
                        conflict.kind.as_str(),
                        conflict.local.change_kind().as_str(),
                        conflict.remote.change_kind().as_str(),
                        conflict.local.timestamp(),
                        conflict.remote.timestamp(),
                        conflict.resolution.as_str(),
                        resolved_at
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<ConflictLogEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, profile_id, entity_kind, entity_id, conflict_kind,
                        local_change, remote_change, local_timestamp, remote_timestamp,
                        resolution, resolved_at
                 FROM sync_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?1",
                params![limit as i64],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_conflict(&row)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Note;
    use crate::sync::{detect, ChangeKind, ChangePayload, ChangeRecord, ConflictKind, ConflictResolver, Resolution};
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_checkpoints_upsert_and_clear() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlSyncStateRepository::new(db.connection());

        repo.save_checkpoint("usb", 10).await.unwrap();
        repo.save_checkpoint("usb", 20).await.unwrap();
        repo.save_checkpoint("server", 5).await.unwrap();

        let checkpoints = repo.checkpoints().await.unwrap();
        assert_eq!(checkpoints.get("usb"), Some(&20));
        assert_eq!(checkpoints.len(), 2);

        assert!(repo.clear_checkpoint("usb").await.unwrap());
        assert!(!repo.clear_checkpoint("usb").await.unwrap());
        assert_eq!(repo.checkpoints().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_log_roundtrip() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlSyncStateRepository::new(db.connection());

        let note = Note::new("shared", "");
        let local = ChangeRecord::updated(ChangePayload::Note(note.clone()), 10);
        let remote = ChangeRecord::updated(ChangePayload::Note(note.clone()), 20);
        let mut conflicts = detect(&[local], &[remote]);
        ConflictResolver::default().resolve_all(&mut conflicts);

        repo.append_conflicts("usb", &conflicts, 99).await.unwrap();

        let entries = repo.list_conflicts(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.profile_id, "usb");
        assert_eq!(entry.entity_id, note.id.as_str());
        assert_eq!(entry.conflict_kind, ConflictKind::ConcurrentModification);
        assert_eq!(entry.local_change, ChangeKind::Updated);
        assert_eq!(entry.resolution, Resolution::KeepRemote);
        assert_eq!(entry.winning_timestamp(), 20);
        assert_eq!(entry.resolved_at, 99);
    }
}
