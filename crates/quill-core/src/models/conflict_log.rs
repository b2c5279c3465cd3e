//! Conflict log model

use serde::{Deserialize, Serialize};

use crate::sync::{ChangeKind, ConflictKind, EntityKind, Resolution};

/// Sync conflict recorded after the resolver decided it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictLogEntry {
    /// Conflict row identifier
    pub id: i64,
    /// Profile whose session hit the conflict
    pub profile_id: String,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub conflict_kind: ConflictKind,
    pub local_change: ChangeKind,
    pub remote_change: ChangeKind,
    pub local_timestamp: i64,
    pub remote_timestamp: i64,
    pub resolution: Resolution,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
}

impl ConflictLogEntry {
    /// Timestamp of the change that survived
    pub const fn winning_timestamp(&self) -> i64 {
        match self.resolution {
            Resolution::KeepRemote => self.remote_timestamp,
            Resolution::KeepLocal | Resolution::Unresolved => self.local_timestamp,
        }
    }
}
