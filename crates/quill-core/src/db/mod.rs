//! Database layer for Quill

mod connection;
mod folder_repository;
mod media_repository;
mod migrations;
mod note_repository;
mod settings_repository;
mod sync_state_repository;
mod tombstone_repository;

use std::str::FromStr;

use crate::error::{Error, Result};

pub use connection::Database;
pub use folder_repository::{FolderRepository, LibSqlFolderRepository};
pub use media_repository::{LibSqlMediaRepository, MediaRepository};
pub use note_repository::{LibSqlNoteRepository, NoteRepository};
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository, REPLICA_ID_KEY};
pub use sync_state_repository::{LibSqlSyncStateRepository, SyncStateRepository};
pub use tombstone_repository::{LibSqlTombstoneRepository, TombstoneRepository};

/// Parse an id column, reporting corrupt rows instead of inventing ids
fn parse_id<T: FromStr>(value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Database(format!("invalid id '{value}' in database")))
}
