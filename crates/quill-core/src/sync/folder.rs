//! Folder-backed transport for removable media and plain local folders.
//!
//! Remote layout under the sync root:
//!
//! ```text
//! sync_manifest.json   bookkeeping: last sync, record count, per-replica cursors
//! sync_changes.json    journal of change records (media content stripped)
//! media/<id>           media content
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::adapter::{ensure_protocol, SyncAdapter};
use super::change::{ChangeKey, ChangeRecord, EntityKind};
use super::error::{SyncError, SyncResult};
use super::profile::{keys, ProtocolKind, SyncProfile};
use crate::util::unix_millis_now;

const SYNC_DIR_NAME: &str = "QuillSync";
const MANIFEST_FILE: &str = "sync_manifest.json";
const CHANGES_FILE: &str = "sync_changes.json";
const MEDIA_DIR: &str = "media";
const FORMAT_VERSION: u32 = 1;

/// Which profile protocol a folder adapter serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderMode {
    /// `path` is the sync root; created when missing
    LocalFolder,
    /// `device_path` is a mount point that must exist; sync root is `<device>/QuillSync`
    RemovableMedia,
}

impl FolderMode {
    pub const fn protocol(self) -> ProtocolKind {
        match self {
            Self::LocalFolder => ProtocolKind::LocalFolder,
            Self::RemovableMedia => ProtocolKind::RemovableMedia,
        }
    }
}

/// Bookkeeping persisted next to the journal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncManifest {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub last_sync_at: Option<i64>,
    #[serde(default)]
    pub record_count: usize,
    #[serde(default)]
    pub last_device: Option<String>,
    /// Highest journal sequence each replica has acknowledged
    #[serde(default)]
    pub cursors: BTreeMap<String, u64>,
}

const fn default_format_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalEntry {
    seq: u64,
    origin: String,
    record: ChangeRecord,
}

/// Adapter that exchanges changes through a directory.
pub struct FolderSyncAdapter {
    mode: FolderMode,
    replica_id: String,
    root: Option<PathBuf>,
    fetched_through: Option<u64>,
}

impl FolderSyncAdapter {
    pub fn new(mode: FolderMode, replica_id: impl Into<String>) -> Self {
        Self {
            mode,
            replica_id: replica_id.into(),
            root: None,
            fetched_through: None,
        }
    }

    /// Sync root while connected.
    pub fn sync_root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Read the manifest at the connected sync root.
    pub async fn manifest(&self) -> SyncResult<SyncManifest> {
        let root = self.connected_root()?;
        read_manifest(root)
            .await
            .map_err(SyncError::EndpointUnavailable)
    }

    fn connected_root(&self) -> SyncResult<&Path> {
        self.root
            .as_deref()
            .ok_or_else(|| SyncError::EndpointUnavailable("folder adapter is not connected".into()))
    }

    async fn resolve_root(&self, profile: &SyncProfile) -> SyncResult<PathBuf> {
        match self.mode {
            FolderMode::LocalFolder => {
                let path = profile.folder_path().ok_or_else(|| {
                    SyncError::ConfigurationInvalid(format!(
                        "profile '{}' is missing required setting '{}'",
                        profile.name,
                        keys::PATH
                    ))
                })?;
                if !is_dir(&path).await {
                    let parent_exists = match path.parent() {
                        Some(parent) if !parent.as_os_str().is_empty() => is_dir(parent).await,
                        _ => true,
                    };
                    if !parent_exists || path.exists() {
                        return Err(SyncError::EndpointUnavailable(format!(
                            "sync folder {} cannot be reached",
                            path.display()
                        )));
                    }
                    fs::create_dir(&path).await.map_err(|error| {
                        SyncError::EndpointUnavailable(format!(
                            "failed to create sync folder {}: {error}",
                            path.display()
                        ))
                    })?;
                }
                Ok(path)
            }
            FolderMode::RemovableMedia => {
                let device = profile.device_path().ok_or_else(|| {
                    SyncError::ConfigurationInvalid(format!(
                        "profile '{}' is missing required setting '{}'",
                        profile.name,
                        keys::DEVICE_PATH
                    ))
                })?;
                if !is_dir(&device).await {
                    return Err(SyncError::EndpointUnavailable(format!(
                        "removable device {} is not mounted",
                        device.display()
                    )));
                }
                Ok(device.join(SYNC_DIR_NAME))
            }
        }
    }
}

#[async_trait]
impl SyncAdapter for FolderSyncAdapter {
    fn protocol(&self) -> ProtocolKind {
        self.mode.protocol()
    }

    async fn connect(&mut self, profile: &SyncProfile) -> SyncResult<()> {
        ensure_protocol(self.mode.protocol(), profile)?;
        let root = self.resolve_root(profile).await?;

        fs::create_dir_all(root.join(MEDIA_DIR))
            .await
            .map_err(|error| {
                SyncError::EndpointUnavailable(format!(
                    "sync folder {} is not writable: {error}",
                    root.display()
                ))
            })?;

        let manifest = read_manifest(&root)
            .await
            .map_err(SyncError::EndpointUnavailable)?;
        if manifest.format_version > FORMAT_VERSION {
            return Err(SyncError::EndpointUnavailable(format!(
                "sync folder {} uses format version {} (supported: {FORMAT_VERSION})",
                root.display(),
                manifest.format_version
            )));
        }

        tracing::info!(
            "Connected {} sync folder at {}",
            self.mode.protocol(),
            root.display()
        );
        self.root = Some(root);
        self.fetched_through = None;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(root) = self.root.take() {
            tracing::debug!("Disconnected sync folder {}", root.display());
        }
        self.fetched_through = None;
    }

    async fn fetch_remote_changes(&mut self) -> SyncResult<Vec<ChangeRecord>> {
        let root = self.connected_root()?.to_path_buf();
        let manifest = read_manifest(&root)
            .await
            .map_err(SyncError::EndpointUnavailable)?;
        let journal = read_journal(&root)
            .await
            .map_err(SyncError::EndpointUnavailable)?;

        let cursor = manifest.cursors.get(&self.replica_id).copied().unwrap_or(0);
        let mut changes = Vec::new();
        for entry in &journal {
            if entry.seq <= cursor || entry.origin == self.replica_id {
                continue;
            }
            let mut record = entry.record.clone();
            if record.entity_kind() == EntityKind::Media && !record.is_deletion() {
                match fs::read(root.join(MEDIA_DIR).join(record.id())).await {
                    Ok(bytes) => record = record.with_blob(bytes),
                    Err(error) => tracing::warn!(
                        "Media content for {} missing from sync folder: {error}",
                        record.id()
                    ),
                }
            }
            changes.push(record);
        }

        let max_seq = journal.iter().map(|entry| entry.seq).max().unwrap_or(0);
        self.fetched_through = Some(max_seq.max(cursor));
        tracing::debug!(
            "Fetched {} change(s) from {} (cursor {cursor})",
            changes.len(),
            root.display()
        );
        Ok(changes)
    }

    async fn push_changes(&mut self, changes: &[ChangeRecord]) -> SyncResult<()> {
        let root = self.connected_root()?.to_path_buf();
        let incomplete = |context: &str, error: String| {
            SyncError::PushIncomplete(format!("{context} in {}: {error}", root.display()))
        };

        let mut manifest = read_manifest(&root)
            .await
            .map_err(|error| incomplete("reading manifest", error))?;
        let mut journal = read_journal(&root)
            .await
            .map_err(|error| incomplete("reading journal", error))?;

        for record in changes {
            if let Some(blob) = record.blob() {
                let path = root.join(MEDIA_DIR).join(record.id());
                write_atomic(&path, blob)
                    .await
                    .map_err(|error| incomplete("writing media", error.to_string()))?;
            }
        }

        if !changes.is_empty() {
            let mut next_seq = journal.iter().map(|entry| entry.seq).max().unwrap_or(0);
            for record in changes {
                next_seq += 1;
                journal.push(JournalEntry {
                    seq: next_seq,
                    origin: self.replica_id.clone(),
                    record: record.without_blob(),
                });
            }
            let journal = compact(journal);
            let encoded = serde_json::to_vec_pretty(&journal)
                .map_err(|error| incomplete("encoding journal", error.to_string()))?;
            write_atomic(&root.join(CHANGES_FILE), &encoded)
                .await
                .map_err(|error| incomplete("writing journal", error.to_string()))?;
            manifest.record_count = journal.len();
        }

        manifest.format_version = FORMAT_VERSION;
        manifest.last_sync_at = Some(unix_millis_now());
        manifest.last_device = Some(self.replica_id.clone());

        let encoded = serde_json::to_vec_pretty(&manifest)
            .map_err(|error| incomplete("encoding manifest", error.to_string()))?;
        write_atomic(&root.join(MANIFEST_FILE), &encoded)
            .await
            .map_err(|error| incomplete("writing manifest", error.to_string()))?;

        for record in changes {
            if record.entity_kind() == EntityKind::Media && record.is_deletion() {
                if let Err(error) = fs::remove_file(root.join(MEDIA_DIR).join(record.id())).await {
                    if error.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove media {} from sync folder: {error}", record.id());
                    }
                }
            }
        }

        tracing::info!(
            "Pushed {} change(s) to {} ({} journal record(s))",
            changes.len(),
            root.display(),
            manifest.record_count
        );
        Ok(())
    }

    async fn acknowledge(&mut self) -> SyncResult<()> {
        let Some(through) = self.fetched_through else {
            return Ok(());
        };
        let root = self.connected_root()?.to_path_buf();
        let incomplete = |context: &str, error: String| {
            SyncError::PushIncomplete(format!("{context} in {}: {error}", root.display()))
        };

        let mut manifest = read_manifest(&root)
            .await
            .map_err(|error| incomplete("reading manifest", error))?;
        if manifest.cursors.get(&self.replica_id) == Some(&through) {
            return Ok(());
        }
        manifest.cursors.insert(self.replica_id.clone(), through);
        manifest.format_version = FORMAT_VERSION;

        let encoded = serde_json::to_vec_pretty(&manifest)
            .map_err(|error| incomplete("encoding manifest", error.to_string()))?;
        write_atomic(&root.join(MANIFEST_FILE), &encoded)
            .await
            .map_err(|error| incomplete("writing manifest", error.to_string()))?;
        tracing::debug!("Acknowledged journal through {through} at {}", root.display());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.root.is_some()
    }
}

/// Keep only the newest journal entry per entity.
fn compact(journal: Vec<JournalEntry>) -> Vec<JournalEntry> {
    let mut newest: HashMap<ChangeKey, JournalEntry> = HashMap::new();
    for entry in journal {
        let key = entry.record.key();
        match newest.get(&key) {
            Some(existing) if existing.seq >= entry.seq => {}
            _ => {
                newest.insert(key, entry);
            }
        }
    }
    let mut compacted = newest.into_values().collect::<Vec<_>>();
    compacted.sort_by_key(|entry| entry.seq);
    compacted
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
}

async fn read_manifest(root: &Path) -> Result<SyncManifest, String> {
    let path = root.join(MANIFEST_FILE);
    match fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|error| format!("invalid manifest {}: {error}", path.display())),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(SyncManifest::default()),
        Err(error) => Err(format!("failed to read {}: {error}", path.display())),
    }
}

async fn read_journal(root: &Path) -> Result<Vec<JournalEntry>, String> {
    let path = root.join(CHANGES_FILE);
    match fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|error| format!("invalid change journal {}: {error}", path.display())),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => Err(format!("failed to read {}: {error}", path.display())),
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    fs::write(&staging, bytes).await?;
    fs::rename(&staging, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaItem, Note};
    use crate::sync::ChangePayload;
    use pretty_assertions::assert_eq;

    fn folder_profile(path: &Path) -> SyncProfile {
        SyncProfile::new("Backup", ProtocolKind::LocalFolder)
            .with_setting(keys::PATH, path.to_string_lossy())
    }

    async fn connected(replica: &str, profile: &SyncProfile) -> FolderSyncAdapter {
        let mut adapter = FolderSyncAdapter::new(FolderMode::LocalFolder, replica);
        adapter.connect(profile).await.unwrap();
        adapter
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connect_rejects_profile_of_other_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let profile = SyncProfile::new("usb", ProtocolKind::RemovableMedia)
            .with_setting(keys::DEVICE_PATH, dir.path().to_string_lossy());

        let mut adapter = FolderSyncAdapter::new(FolderMode::LocalFolder, "a");
        let error = adapter.connect(&profile).await.unwrap_err();
        assert!(matches!(error, SyncError::ProfileMismatch { .. }));
        assert!(!adapter.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_folder_is_created_but_parent_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sync");

        let adapter = connected("a", &folder_profile(&target)).await;
        assert!(adapter.is_connected());
        assert!(target.join(MEDIA_DIR).is_dir());

        let unreachable = dir.path().join("missing").join("sync");
        let mut adapter = FolderSyncAdapter::new(FolderMode::LocalFolder, "a");
        let error = adapter
            .connect(&folder_profile(&unreachable))
            .await
            .unwrap_err();
        assert!(matches!(error, SyncError::EndpointUnavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn removable_media_requires_mounted_device() {
        let dir = tempfile::tempdir().unwrap();
        let profile = SyncProfile::new("usb", ProtocolKind::RemovableMedia)
            .with_setting(keys::DEVICE_PATH, dir.path().join("usb0").to_string_lossy());

        let mut adapter = FolderSyncAdapter::new(FolderMode::RemovableMedia, "a");
        let error = adapter.connect(&profile).await.unwrap_err();
        assert!(matches!(error, SyncError::EndpointUnavailable(ref msg) if msg.contains("not mounted")));

        std::fs::create_dir(dir.path().join("usb0")).unwrap();
        adapter.connect(&profile).await.unwrap();
        assert_eq!(
            adapter.sync_root(),
            Some(dir.path().join("usb0").join(SYNC_DIR_NAME).as_path())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disconnect_is_safe_when_never_connected() {
        let mut adapter = FolderSyncAdapter::new(FolderMode::LocalFolder, "a");
        adapter.disconnect().await;
        assert!(!adapter.is_connected());
        assert!(matches!(
            adapter.fetch_remote_changes().await,
            Err(SyncError::EndpointUnavailable(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn changes_flow_between_replicas_with_media_content() {
        let dir = tempfile::tempdir().unwrap();
        let profile = folder_profile(dir.path());

        let note = Note::new("Shopping", "eggs");
        let item = MediaItem::new("cat.png", "image/png", 3).unwrap();
        let pushed = vec![
            ChangeRecord::created(ChangePayload::Note(note.clone()), note.updated_at),
            ChangeRecord::created(
                ChangePayload::Media {
                    item: item.clone(),
                    blob: Some(vec![7, 8, 9]),
                },
                item.updated_at,
            ),
        ];

        let mut replica_a = connected("a", &profile).await;
        assert!(replica_a.fetch_remote_changes().await.unwrap().is_empty());
        replica_a.push_changes(&pushed).await.unwrap();
        replica_a.disconnect().await;

        let mut replica_b = connected("b", &profile).await;
        let mut fetched = replica_b.fetch_remote_changes().await.unwrap();
        fetched.sort_by_key(ChangeRecord::entity_kind);
        let mut expected = pushed.clone();
        expected.sort_by_key(ChangeRecord::entity_kind);
        assert_eq!(fetched, expected);

        replica_b.acknowledge().await.unwrap();
        assert!(replica_b.fetch_remote_changes().await.unwrap().is_empty());

        let manifest = replica_b.manifest().await.unwrap();
        assert_eq!(manifest.record_count, 2);
        assert_eq!(manifest.cursors.get("b"), Some(&2));
        assert_eq!(manifest.last_device.as_deref(), Some("a"));

        let mut replica_a = connected("a", &profile).await;
        assert!(replica_a.fetch_remote_changes().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unacknowledged_fetch_is_redelivered() {
        let dir = tempfile::tempdir().unwrap();
        let profile = folder_profile(dir.path());
        let note = Note::new("t", "c");

        let mut writer = connected("a", &profile).await;
        writer
            .push_changes(&[ChangeRecord::created(ChangePayload::Note(note), 1)])
            .await
            .unwrap();

        let mut reader = connected("b", &profile).await;
        assert_eq!(reader.fetch_remote_changes().await.unwrap().len(), 1);
        reader.push_changes(&[]).await.unwrap();
        reader.disconnect().await;

        let mut reader = connected("b", &profile).await;
        assert_eq!(reader.fetch_remote_changes().await.unwrap().len(), 1);
        reader.acknowledge().await.unwrap();
        reader.disconnect().await;

        let mut reader = connected("b", &profile).await;
        assert!(reader.fetch_remote_changes().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn acknowledge_without_fetch_leaves_manifest_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = connected("a", &folder_profile(dir.path())).await;
        adapter.acknowledge().await.unwrap();
        assert!(adapter.manifest().await.unwrap().cursors.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn journal_keeps_newest_entry_per_entity() {
        let dir = tempfile::tempdir().unwrap();
        let profile = folder_profile(dir.path());
        let mut note = Note::new("t", "v1");

        let mut writer = connected("a", &profile).await;
        writer
            .push_changes(&[ChangeRecord::created(ChangePayload::Note(note.clone()), 1)])
            .await
            .unwrap();
        note.content = "v2".to_string();
        writer
            .push_changes(&[ChangeRecord::updated(ChangePayload::Note(note.clone()), 2)])
            .await
            .unwrap();
        writer
            .push_changes(&[ChangeRecord::deleted(EntityKind::Note, note.id.as_str(), 3)])
            .await
            .unwrap();

        assert_eq!(writer.manifest().await.unwrap().record_count, 1);

        let mut reader = connected("b", &profile).await;
        let fetched = reader.fetch_remote_changes().await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert!(fetched[0].is_deletion());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn media_deletion_removes_content() {
        let dir = tempfile::tempdir().unwrap();
        let profile = folder_profile(dir.path());
        let item = MediaItem::new("a.bin", "", 1).unwrap();

        let mut writer = connected("a", &profile).await;
        writer
            .push_changes(&[ChangeRecord::created(
                ChangePayload::Media {
                    item: item.clone(),
                    blob: Some(vec![1]),
                },
                1,
            )])
            .await
            .unwrap();
        let blob_path = dir.path().join(MEDIA_DIR).join(item.id.as_str());
        assert!(blob_path.exists());

        writer
            .push_changes(&[ChangeRecord::deleted(EntityKind::Media, item.id.as_str(), 2)])
            .await
            .unwrap();
        assert!(!blob_path.exists());
    }
}
