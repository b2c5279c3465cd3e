//! Batch synchronization between the local store and one remote per session.
//!
//! Sync is pull-then-push: the orchestrator fetches the remote change set,
//! collects local changes since the profile checkpoint, resolves conflicts
//! and propagates the merged result to both sides.

mod adapter;
mod change;
mod collector;
pub mod conflict;
mod error;
mod folder;
mod network;
mod orchestrator;
pub mod profile;
mod store;

pub use adapter::{AdapterRegistry, SyncAdapter};
pub use change::{ChangeKey, ChangeKind, ChangePayload, ChangeRecord, EntityKind, Tombstone};
pub use collector::{latest_per_entity, merge_changes, LocalChangeCollector};
pub use conflict::{
    detect, settled_deletions, ConflictKind, ConflictPolicy, ConflictResolver, Resolution,
    SyncConflict,
};
pub use error::{SyncError, SyncResult};
pub use folder::{FolderMode, FolderSyncAdapter, SyncManifest};
pub use network::{NetworkSyncAdapter, PushRequest, RemoteChanges};
pub use orchestrator::{SessionState, SyncOptions, SyncOrchestrator, SyncReport};
pub use profile::{ProtocolKind, SyncProfile};
pub use store::{CheckpointStore, EntityStore};
