//! Conflict detection and resolution.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::change::{ChangeKey, ChangeRecord};

/// How the two sides disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides created or updated the entity
    ConcurrentModification,
    /// One side deleted the entity, the other modified it
    DeleteVsModify,
}

impl ConflictKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConcurrentModification => "concurrent_modification",
            Self::DeleteVsModify => "delete_vs_modify",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side's change survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
    #[default]
    Unresolved,
}

impl Resolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep_local",
            Self::KeepRemote => "keep_remote",
            Self::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local and a remote change to the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub local: ChangeRecord,
    pub remote: ChangeRecord,
    pub kind: ConflictKind,
    pub resolution: Resolution,
}

impl SyncConflict {
    pub fn key(&self) -> ChangeKey {
        self.local.key()
    }
}

/// Pair up local and remote changes that touch the same entity incompatibly.
///
/// Two deletions of the same entity agree with each other and are not
/// reported; see [`settled_deletions`].
pub fn detect(local: &[ChangeRecord], remote: &[ChangeRecord]) -> Vec<SyncConflict> {
    let mut remote_by_key: HashMap<ChangeKey, Vec<&ChangeRecord>> = HashMap::new();
    for record in remote {
        remote_by_key.entry(record.key()).or_default().push(record);
    }

    let mut conflicts = Vec::new();
    for local_record in local {
        let Some(candidates) = remote_by_key.get(&local_record.key()) else {
            continue;
        };
        for remote_record in candidates {
            let kind = match (local_record.is_deletion(), remote_record.is_deletion()) {
                (true, true) => continue,
                (false, false) => ConflictKind::ConcurrentModification,
                _ => ConflictKind::DeleteVsModify,
            };
            conflicts.push(SyncConflict {
                local: local_record.clone(),
                remote: (*remote_record).clone(),
                kind,
                resolution: Resolution::Unresolved,
            });
        }
    }
    conflicts
}

/// Entities deleted on both sides; neither side needs to apply anything.
pub fn settled_deletions(local: &[ChangeRecord], remote: &[ChangeRecord]) -> HashSet<ChangeKey> {
    let remote_deleted = remote
        .iter()
        .filter(|record| record.is_deletion())
        .map(ChangeRecord::key)
        .collect::<HashSet<_>>();

    local
        .iter()
        .filter(|record| record.is_deletion())
        .map(ChangeRecord::key)
        .filter(|key| remote_deleted.contains(key))
        .collect()
}

/// Policy for delete-versus-modify conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// A modification survives a deletion only when it is strictly newer
    #[default]
    NewestWins,
    /// A deletion always survives
    DeletionWins,
}

/// Deterministic, total conflict resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    pub const fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// Decide `conflict` and record the decision on it.
    pub fn resolve(&self, conflict: &mut SyncConflict) -> Resolution {
        let resolution = self.decide(conflict);
        conflict.resolution = resolution;
        resolution
    }

    pub fn resolve_all(&self, conflicts: &mut [SyncConflict]) {
        for conflict in conflicts.iter_mut() {
            let resolution = self.resolve(conflict);
            tracing::debug!(
                "Resolved {} conflict on {} as {}",
                conflict.kind,
                conflict.key(),
                resolution
            );
        }
    }

    fn decide(&self, conflict: &SyncConflict) -> Resolution {
        let local = &conflict.local;
        let remote = &conflict.remote;

        match conflict.kind {
            // Ties stay local so the same pair always resolves the same way.
            ConflictKind::ConcurrentModification => {
                if remote.timestamp() > local.timestamp() {
                    Resolution::KeepRemote
                } else {
                    Resolution::KeepLocal
                }
            }
            ConflictKind::DeleteVsModify if local.is_deletion() => Resolution::KeepLocal,
            ConflictKind::DeleteVsModify => match self.policy {
                ConflictPolicy::DeletionWins => Resolution::KeepRemote,
                ConflictPolicy::NewestWins => {
                    if local.timestamp() > remote.timestamp() {
                        Resolution::KeepLocal
                    } else {
                        Resolution::KeepRemote
                    }
                }
            },
        }
    }
}
