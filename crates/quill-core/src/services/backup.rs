//! Whole-store backups.
//!
//! A backup is one JSON document holding every folder, note and media item
//! with its content, in the same payload form the sync engine exchanges.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::{ChangePayload, EntityKind};

pub const BACKUP_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub format_version: u32,
    pub created_at: i64,
    /// Folders, then notes, then media
    pub entities: Vec<ChangePayload>,
}

/// What a restore changed in the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub restored: usize,
    /// Local entities absent from the backup, now deleted
    pub removed: usize,
}

impl Backup {
    pub fn count(&self, kind: EntityKind) -> usize {
        self.entities
            .iter()
            .filter(|payload| payload.entity_kind() == kind)
            .count()
    }

    /// Write the backup to `path`, replacing it only once fully written.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let encoded = serde_json::to_vec_pretty(self)?;
        let staging = path.with_extension("partial");
        tokio::fs::write(&staging, encoded).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }

    pub async fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read(path.as_ref()).await?;
        let backup = serde_json::from_slice::<Self>(&raw)?;
        if backup.format_version > BACKUP_FORMAT_VERSION {
            return Err(Error::InvalidInput(format!(
                "backup format version {} is newer than supported ({BACKUP_FORMAT_VERSION})",
                backup.format_version
            )));
        }
        Ok(backup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn newer_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        let backup = Backup {
            format_version: BACKUP_FORMAT_VERSION + 1,
            created_at: 1,
            entities: vec![ChangePayload::Note(Note::new("n", ""))],
        };
        backup.write_to(&path).await.unwrap();
        assert!(!path.with_extension("partial").exists());

        let error = Backup::read_from(&path).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(ref msg) if msg.contains("newer")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn garbage_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Backup::read_from(&path).await,
            Err(Error::Serialization(_))
        ));
        assert_eq!(
            Backup {
                format_version: 1,
                created_at: 0,
                entities: Vec::new()
            }
            .count(EntityKind::Note),
            0
        );
    }
}
