//! Seams between the sync engine and local persistence.

use std::collections::HashMap;

use async_trait::async_trait;

use super::change::{ChangePayload, ChangeRecord, EntityKind, Tombstone};
use super::conflict::SyncConflict;
use crate::error::Result;

/// Local entity repositories as seen by the sync engine.
///
/// Implementations must tolerate concurrent readers and serialize writers.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Entities of `kind` whose `updated_at` is after `since` (all when `None`).
    ///
    /// Media payloads include their blob.
    async fn modified_since(
        &self,
        kind: EntityKind,
        since: Option<i64>,
    ) -> Result<Vec<ChangePayload>>;

    /// Tombstones recorded after `since` (all when `None`).
    async fn tombstones_since(&self, since: Option<i64>) -> Result<Vec<Tombstone>>;

    /// Commit remote changes together with the session's conflict log.
    ///
    /// Saves replace an entity exactly as given, timestamps included, and
    /// clear its tombstone. Deletions remove the entity and leave a tombstone
    /// at the record's timestamp. On error nothing is applied and nothing is
    /// logged.
    async fn apply_remote(
        &self,
        profile_id: &str,
        changes: &[ChangeRecord],
        conflicts: &[SyncConflict],
    ) -> Result<()>;
}

/// Persistence for the per-profile last-sync checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load_checkpoints(&self) -> Result<HashMap<String, i64>>;

    async fn save_checkpoint(&self, profile_id: &str, timestamp: i64) -> Result<()>;
}
