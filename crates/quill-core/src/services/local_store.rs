//! Local store shared by the CLI and the sync engine.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::db::{
    Database, FolderRepository, LibSqlFolderRepository, LibSqlMediaRepository,
    LibSqlNoteRepository, LibSqlSettingsRepository, LibSqlSyncStateRepository,
    LibSqlTombstoneRepository, MediaRepository, NoteRepository, SettingsRepository,
    SyncStateRepository, TombstoneRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    ConflictLogEntry, Folder, FolderId, MediaId, MediaItem, Note, NoteId,
};
use crate::services::{Backup, RestoreSummary, BACKUP_FORMAT_VERSION};
use crate::storage::MediaBlobStore;
use crate::sync::{
    ChangePayload, ChangeRecord, CheckpointStore, EntityKind, EntityStore, SyncConflict,
    Tombstone,
};
use crate::util::unix_millis_now;

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "quill.db";
/// Media blob directory name inside the data directory
pub const MEDIA_DIR: &str = "media";
/// Default tombstone retention: 30 days
pub const TOMBSTONE_RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Thread-safe service over the database and the media blob directory.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    blobs: MediaBlobStore,
    data_dir: Option<PathBuf>,
}

impl LocalStore {
    /// Open (creating when missing) the store under `data_dir`.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;

        let db = Database::open(data_dir.join(DATABASE_FILE)).await?;
        let blobs = MediaBlobStore::open(data_dir.join(MEDIA_DIR)).await?;
        tracing::debug!("Opened local store at {}", data_dir.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            blobs,
            data_dir: Some(data_dir),
        })
    }

    /// In-memory database with media blobs under `media_dir` (primarily for tests).
    pub async fn open_in_memory(media_dir: impl Into<PathBuf>) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        let blobs = MediaBlobStore::open(media_dir).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            blobs,
            data_dir: None,
        })
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub const fn blobs(&self) -> &MediaBlobStore {
        &self.blobs
    }

    /// Stable identity of this replica.
    pub async fn replica_id(&self) -> Result<String> {
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection())
            .replica_id()
            .await
    }

    // Notes

    /// Create a note, optionally filed under an existing folder.
    pub async fn create_note(
        &self,
        title: &str,
        content: &str,
        folder_id: Option<FolderId>,
    ) -> Result<Note> {
        let mut note = Note::new(title.trim(), content);
        if note.is_empty() {
            return Err(Error::InvalidInput(
                "Note title and content cannot both be empty".to_string(),
            ));
        }
        note.folder_id = folder_id;

        let db = self.db.lock().await;
        if let Some(folder_id) = &folder_id {
            Self::require_folder(db.connection(), folder_id).await?;
        }
        LibSqlNoteRepository::new(db.connection())
            .upsert(&note)
            .await?;
        tracing::debug!("Created note {}", note.id);
        Ok(note)
    }

    /// Replace a note's title and/or content.
    pub async fn update_note(
        &self,
        id: &NoteId,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<Note> {
        let db = self.db.lock().await;
        let repo = LibSqlNoteRepository::new(db.connection());
        let mut note = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("note {id}")))?;

        if let Some(title) = title {
            note.title = title.trim().to_string();
        }
        if let Some(content) = content {
            note.content = content.to_string();
        }
        if note.is_empty() {
            return Err(Error::InvalidInput(
                "Note title and content cannot both be empty".to_string(),
            ));
        }
        note.updated_at = next_timestamp(note.updated_at);
        repo.upsert(&note).await?;
        Ok(note)
    }

    /// File a note under `folder_id`, or at the top level when `None`.
    pub async fn move_note(&self, id: &NoteId, folder_id: Option<FolderId>) -> Result<Note> {
        let db = self.db.lock().await;
        if let Some(folder_id) = &folder_id {
            Self::require_folder(db.connection(), folder_id).await?;
        }
        let repo = LibSqlNoteRepository::new(db.connection());
        let mut note = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("note {id}")))?;
        note.folder_id = folder_id;
        note.updated_at = next_timestamp(note.updated_at);
        repo.upsert(&note).await?;
        Ok(note)
    }

    pub async fn get_note(&self, id: &NoteId) -> Result<Option<Note>> {
        let db = self.db.lock().await;
        LibSqlNoteRepository::new(db.connection()).get(id).await
    }

    /// List notes newest-first.
    pub async fn list_notes(&self, limit: usize, offset: usize) -> Result<Vec<Note>> {
        let db = self.db.lock().await;
        LibSqlNoteRepository::new(db.connection())
            .list(limit, offset)
            .await
    }

    pub async fn list_notes_in_folder(&self, folder_id: &FolderId) -> Result<Vec<Note>> {
        let db = self.db.lock().await;
        LibSqlNoteRepository::new(db.connection())
            .list_in_folder(folder_id)
            .await
    }

    pub async fn list_notes_by_tag(&self, tag: &str, limit: usize) -> Result<Vec<Note>> {
        let db = self.db.lock().await;
        LibSqlNoteRepository::new(db.connection())
            .list_by_tag(tag, limit)
            .await
    }

    /// Notes whose title or content contains `query`, newest first.
    pub async fn search_notes(&self, query: &str, limit: usize) -> Result<Vec<Note>> {
        let db = self.db.lock().await;
        LibSqlNoteRepository::new(db.connection())
            .search(query, limit)
            .await
    }

    /// Delete a note and leave a tombstone for sync.
    pub async fn delete_note(&self, id: &NoteId) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        if LibSqlNoteRepository::new(conn).get(id).await?.is_none() {
            return Err(Error::NotFound(format!("note {id}")));
        }
        LibSqlTombstoneRepository::new(conn)
            .record(EntityKind::Note, &id.as_str(), unix_millis_now())
            .await?;
        LibSqlNoteRepository::new(conn).delete(id).await?;
        Ok(())
    }

    // Folders

    pub async fn create_folder(&self, name: &str, parent_id: Option<FolderId>) -> Result<Folder> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Folder name cannot be empty".to_string(),
            ));
        }

        let db = self.db.lock().await;
        if let Some(parent_id) = &parent_id {
            Self::require_folder(db.connection(), parent_id).await?;
        }
        let mut folder = Folder::new(name);
        folder.parent_id = parent_id;
        LibSqlFolderRepository::new(db.connection())
            .upsert(&folder)
            .await?;
        Ok(folder)
    }

    pub async fn rename_folder(&self, id: &FolderId, name: &str) -> Result<Folder> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Folder name cannot be empty".to_string(),
            ));
        }

        let db = self.db.lock().await;
        let repo = LibSqlFolderRepository::new(db.connection());
        let mut folder = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("folder {id}")))?;
        folder.name = name.to_string();
        folder.updated_at = next_timestamp(folder.updated_at);
        repo.upsert(&folder).await?;
        Ok(folder)
    }

    /// Re-parent a folder, or promote it to the top level when `parent_id` is `None`.
    ///
    /// Rejects a parent that is the folder itself or one of its descendants.
    pub async fn move_folder(&self, id: &FolderId, parent_id: Option<FolderId>) -> Result<Folder> {
        let db = self.db.lock().await;
        let repo = LibSqlFolderRepository::new(db.connection());
        let mut folder = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("folder {id}")))?;

        let mut ancestor = parent_id;
        let mut seen = HashSet::new();
        while let Some(current) = ancestor {
            if current == *id {
                return Err(Error::InvalidInput(format!(
                    "Folder {id} cannot be moved into itself or one of its subfolders"
                )));
            }
            if !seen.insert(current) {
                break;
            }
            let parent = repo
                .get(&current)
                .await?
                .ok_or_else(|| Error::NotFound(format!("folder {current}")))?;
            ancestor = parent.parent_id;
        }

        if folder.parent_id == parent_id {
            return Ok(folder);
        }
        folder.parent_id = parent_id;
        folder.updated_at = next_timestamp(folder.updated_at);
        repo.upsert(&folder).await?;
        Ok(folder)
    }

    pub async fn get_folder(&self, id: &FolderId) -> Result<Option<Folder>> {
        let db = self.db.lock().await;
        LibSqlFolderRepository::new(db.connection()).get(id).await
    }

    pub async fn list_folders(&self) -> Result<Vec<Folder>> {
        let db = self.db.lock().await;
        LibSqlFolderRepository::new(db.connection()).list().await
    }

    /// Delete an empty folder and leave a tombstone for sync.
    pub async fn delete_folder(&self, id: &FolderId) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let folders = LibSqlFolderRepository::new(conn);
        if folders.get(id).await?.is_none() {
            return Err(Error::NotFound(format!("folder {id}")));
        }
        let notes = LibSqlNoteRepository::new(conn).count_in_folder(id).await?;
        let children = folders.children(id).await?.len();
        if notes > 0 || children > 0 {
            return Err(Error::InvalidInput(format!(
                "Folder {id} is not empty ({notes} note(s), {children} subfolder(s))"
            )));
        }

        LibSqlTombstoneRepository::new(conn)
            .record(EntityKind::Folder, &id.as_str(), unix_millis_now())
            .await?;
        folders.delete(id).await?;
        Ok(())
    }

    // Media

    /// Copy a file into the store.
    pub async fn import_media(&self, path: impl AsRef<Path>) -> Result<MediaItem> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                Error::InvalidInput(format!("{} is not a file path", path.display()))
            })?;
        let bytes = tokio::fs::read(path).await?;
        self.add_media(&file_name, "", &bytes).await
    }

    /// Store media content under a new id.
    pub async fn add_media(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<MediaItem> {
        let size = i64::try_from(bytes.len())
            .map_err(|_| Error::InvalidInput("Media content is too large".to_string()))?;
        let item = MediaItem::new(file_name, mime_type, size)?;

        self.blobs.write(&item.id, bytes).await?;
        let db = self.db.lock().await;
        LibSqlMediaRepository::new(db.connection())
            .upsert(&item)
            .await?;
        tracing::debug!("Stored media {} ({} bytes)", item.id, item.size_bytes);
        Ok(item)
    }

    pub async fn get_media(&self, id: &MediaId) -> Result<Option<MediaItem>> {
        let db = self.db.lock().await;
        LibSqlMediaRepository::new(db.connection()).get(id).await
    }

    pub async fn list_media(&self) -> Result<Vec<MediaItem>> {
        let db = self.db.lock().await;
        LibSqlMediaRepository::new(db.connection()).list().await
    }

    /// Media content, `None` when the item has no stored blob.
    pub async fn read_media(&self, id: &MediaId) -> Result<Option<Vec<u8>>> {
        self.blobs.read(id).await
    }

    /// Write media content to `destination`.
    pub async fn export_media(&self, id: &MediaId, destination: impl AsRef<Path>) -> Result<()> {
        let bytes = self
            .read_media(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("media content {id}")))?;
        tokio::fs::write(destination, bytes).await?;
        Ok(())
    }

    /// Delete media metadata and content and leave a tombstone for sync.
    pub async fn delete_media(&self, id: &MediaId) -> Result<()> {
        {
            let db = self.db.lock().await;
            let conn = db.connection();
            let repo = LibSqlMediaRepository::new(conn);
            if repo.get(id).await?.is_none() {
                return Err(Error::NotFound(format!("media {id}")));
            }
            LibSqlTombstoneRepository::new(conn)
                .record(EntityKind::Media, &id.as_str(), unix_millis_now())
                .await?;
            repo.delete(id).await?;
        }
        self.blobs.remove(id).await?;
        Ok(())
    }

    // Backups

    /// Snapshot every folder, note and media item, content included.
    pub async fn export_backup(&self) -> Result<Backup> {
        let mut entities = Vec::new();
        for kind in EntityKind::ALL {
            entities.extend(self.modified_since(kind, None).await?);
        }
        Ok(Backup {
            format_version: BACKUP_FORMAT_VERSION,
            created_at: unix_millis_now(),
            entities,
        })
    }

    /// Replace the store's content with `backup`.
    ///
    /// Local entities missing from the backup are deleted with tombstones.
    /// Restored entities keep their timestamps, so every sync checkpoint is
    /// cleared and the next session with each profile compares everything.
    pub async fn restore_backup(&self, backup: &Backup) -> Result<RestoreSummary> {
        let keep = backup
            .entities
            .iter()
            .map(|payload| (payload.entity_kind(), payload.entity_id()))
            .collect::<HashSet<_>>();

        let removed = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let stale = stale_entities(conn, &keep).await?;
            conn.execute("BEGIN TRANSACTION", ()).await?;
            if let Err(error) = restore_in(conn, &stale, &backup.entities).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error);
            }
            if let Err(error) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error.into());
            }
            stale
        };

        for payload in &backup.entities {
            if let ChangePayload::Media {
                item,
                blob: Some(bytes),
            } = payload
            {
                self.blobs.write(&item.id, bytes).await?;
            }
        }
        for (kind, id) in &removed {
            if *kind == EntityKind::Media {
                self.blobs.remove(&parse_entity_id(*kind, id)?).await?;
            }
        }

        let summary = RestoreSummary {
            restored: backup.entities.len(),
            removed: removed.len(),
        };
        tracing::info!(
            "Restored {} entit(ies) from backup, removed {}",
            summary.restored,
            summary.removed
        );
        Ok(summary)
    }

    // Sync bookkeeping

    /// List recently resolved sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<ConflictLogEntry>> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .list_conflicts(limit)
            .await
    }

    /// Last successful sync per profile id.
    pub async fn list_checkpoints(&self) -> Result<HashMap<String, i64>> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .checkpoints()
            .await
    }

    /// Forget a profile's checkpoint so its next session re-diffs everything.
    pub async fn reset_checkpoint(&self, profile_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .clear_checkpoint(profile_id)
            .await
    }

    /// Drop tombstones older than `retention_ms`. Returns the number removed.
    pub async fn prune_tombstones(&self, retention_ms: i64) -> Result<u64> {
        let cutoff = unix_millis_now().saturating_sub(retention_ms);
        let db = self.db.lock().await;
        let removed = LibSqlTombstoneRepository::new(db.connection())
            .prune(cutoff)
            .await?;
        if removed > 0 {
            tracing::info!("Pruned {removed} tombstone(s) deleted before {cutoff}");
        }
        Ok(removed)
    }

    async fn require_folder(conn: &libsql::Connection, id: &FolderId) -> Result<()> {
        if LibSqlFolderRepository::new(conn).get(id).await?.is_some() {
            Ok(())
        } else {
            Err(Error::NotFound(format!("folder {id}")))
        }
    }
}

/// Edits always move `updated_at` forward, even within one millisecond.
fn next_timestamp(previous: i64) -> i64 {
    unix_millis_now().max(previous.saturating_add(1))
}

fn parse_entity_id<T: FromStr>(kind: EntityKind, id: &str) -> Result<T> {
    id.parse()
        .map_err(|_| Error::InvalidInput(format!("invalid {kind} id '{id}'")))
}

#[async_trait]
impl EntityStore for LocalStore {
    async fn modified_since(
        &self,
        kind: EntityKind,
        since: Option<i64>,
    ) -> Result<Vec<ChangePayload>> {
        let db = self.db.lock().await;
        let conn = db.connection();
        match kind {
            EntityKind::Note => Ok(LibSqlNoteRepository::new(conn)
                .modified_since(since)
                .await?
                .into_iter()
                .map(ChangePayload::Note)
                .collect()),
            EntityKind::Folder => Ok(LibSqlFolderRepository::new(conn)
                .modified_since(since)
                .await?
                .into_iter()
                .map(ChangePayload::Folder)
                .collect()),
            EntityKind::Media => {
                let items = LibSqlMediaRepository::new(conn).modified_since(since).await?;
                drop(db);
                let mut payloads = Vec::with_capacity(items.len());
                for item in items {
                    let blob = self.blobs.read(&item.id).await?;
                    if blob.is_none() {
                        tracing::warn!("Media {} has no stored content", item.id);
                    }
                    payloads.push(ChangePayload::Media { item, blob });
                }
                Ok(payloads)
            }
        }
    }

    async fn tombstones_since(&self, since: Option<i64>) -> Result<Vec<Tombstone>> {
        let db = self.db.lock().await;
        LibSqlTombstoneRepository::new(db.connection())
            .since(since)
            .await
    }

    async fn apply_remote(
        &self,
        profile_id: &str,
        changes: &[ChangeRecord],
        conflicts: &[SyncConflict],
    ) -> Result<()> {
        if changes.is_empty() && conflicts.is_empty() {
            return Ok(());
        }

        {
            let db = self.db.lock().await;
            let conn = db.connection();
            conn.execute("BEGIN TRANSACTION", ()).await?;
            if let Err(error) = apply_in(conn, profile_id, changes, conflicts).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error);
            }
            if let Err(error) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error.into());
            }
        }

        // Content follows committed metadata; a failure here leaves the
        // session unacknowledged, so the records arrive again.
        for record in changes {
            match record.payload() {
                Some(ChangePayload::Media {
                    item,
                    blob: Some(bytes),
                }) => self.blobs.write(&item.id, bytes).await?,
                Some(ChangePayload::Media { item, blob: None }) => {
                    tracing::warn!("Saved media {} without content", item.id);
                }
                None if record.entity_kind() == EntityKind::Media => {
                    let media_id: MediaId = parse_entity_id(EntityKind::Media, record.id())?;
                    self.blobs.remove(&media_id).await?;
                }
                _ => {}
            }
        }

        tracing::debug!(
            "Applied {} remote change(s) and logged {} conflict(s) for {profile_id}",
            changes.len(),
            conflicts.len()
        );
        Ok(())
    }
}

/// Local entities not listed in `keep`, children before parents.
async fn stale_entities(
    conn: &libsql::Connection,
    keep: &HashSet<(EntityKind, String)>,
) -> Result<Vec<(EntityKind, String)>> {
    let mut ids = Vec::new();
    for item in LibSqlMediaRepository::new(conn).list().await? {
        ids.push((EntityKind::Media, item.id.as_str()));
    }
    for note in LibSqlNoteRepository::new(conn).modified_since(None).await? {
        ids.push((EntityKind::Note, note.id.as_str()));
    }
    for folder in LibSqlFolderRepository::new(conn).list().await? {
        ids.push((EntityKind::Folder, folder.id.as_str()));
    }
    ids.retain(|entry| !keep.contains(entry));
    Ok(ids)
}

/// Statements of one restore; the caller owns the transaction.
async fn restore_in(
    conn: &libsql::Connection,
    stale: &[(EntityKind, String)],
    entities: &[ChangePayload],
) -> Result<()> {
    let removed_at = unix_millis_now();
    for (kind, id) in stale {
        delete_in(conn, *kind, id, removed_at).await?;
    }
    for payload in entities {
        save_in(conn, payload).await?;
    }

    let checkpoints = LibSqlSyncStateRepository::new(conn);
    for profile_id in checkpoints.checkpoints().await?.keys() {
        checkpoints.clear_checkpoint(profile_id).await?;
    }
    Ok(())
}

/// Statements of one remote apply; the caller owns the transaction.
async fn apply_in(
    conn: &libsql::Connection,
    profile_id: &str,
    changes: &[ChangeRecord],
    conflicts: &[SyncConflict],
) -> Result<()> {
    for record in changes {
        match record.payload() {
            Some(payload) => save_in(conn, payload).await?,
            None => {
                delete_in(conn, record.entity_kind(), record.id(), record.timestamp()).await?;
            }
        }
    }
    if !conflicts.is_empty() {
        LibSqlSyncStateRepository::new(conn)
            .append_conflicts(profile_id, conflicts, unix_millis_now())
            .await?;
    }
    Ok(())
}

async fn save_in(conn: &libsql::Connection, payload: &ChangePayload) -> Result<()> {
    LibSqlTombstoneRepository::new(conn)
        .clear(payload.entity_kind(), &payload.entity_id())
        .await?;
    match payload {
        ChangePayload::Note(note) => LibSqlNoteRepository::new(conn).upsert(note).await,
        ChangePayload::Folder(folder) => LibSqlFolderRepository::new(conn).upsert(folder).await,
        ChangePayload::Media { item, .. } => LibSqlMediaRepository::new(conn).upsert(item).await,
    }
}

async fn delete_in(
    conn: &libsql::Connection,
    kind: EntityKind,
    id: &str,
    deleted_at: i64,
) -> Result<bool> {
    LibSqlTombstoneRepository::new(conn)
        .record(kind, id, deleted_at)
        .await?;

    match kind {
        EntityKind::Note => {
            LibSqlNoteRepository::new(conn)
                .delete(&parse_entity_id(kind, id)?)
                .await
        }
        EntityKind::Folder => {
            let folder_id: FolderId = parse_entity_id(kind, id)?;
            // Orphans stay reachable and their move propagates next session
            let now = unix_millis_now();
            let notes = LibSqlNoteRepository::new(conn)
                .detach_folder(&folder_id, now)
                .await?;
            let folders = LibSqlFolderRepository::new(conn);
            let children = folders.detach_children(&folder_id, now).await?;
            if notes + children > 0 {
                tracing::info!(
                    "Moved {notes} note(s) and {children} folder(s) out of deleted folder {folder_id}"
                );
            }
            folders.delete(&folder_id).await
        }
        EntityKind::Media => {
            LibSqlMediaRepository::new(conn)
                .delete(&parse_entity_id(kind, id)?)
                .await
        }
    }
}

#[async_trait]
impl CheckpointStore for LocalStore {
    async fn load_checkpoints(&self) -> Result<HashMap<String, i64>> {
        self.list_checkpoints().await
    }

    async fn save_checkpoint(&self, profile_id: &str, timestamp: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .save_checkpoint(profile_id, timestamp)
            .await
    }
}
