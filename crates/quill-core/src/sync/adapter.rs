//! Transport adapter contract and the protocol registry.

use std::collections::HashMap;

use async_trait::async_trait;

use super::change::ChangeRecord;
use super::error::{SyncError, SyncResult};
use super::folder::{FolderMode, FolderSyncAdapter};
use super::network::NetworkSyncAdapter;
use super::profile::{ProtocolKind, SyncProfile};

/// Boundary over one physical sync medium.
///
/// An adapter instance serves a single session: the orchestrator creates one
/// from the registry, connects it, exchanges changes and disconnects it.
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    /// Protocol this adapter speaks.
    fn protocol(&self) -> ProtocolKind;

    /// Validate the profile against this adapter and reach the endpoint.
    ///
    /// Fails with `ProfileMismatch` for a profile of another protocol and
    /// `EndpointUnavailable` when the path or host cannot be reached.
    async fn connect(&mut self, profile: &SyncProfile) -> SyncResult<()>;

    /// Release the endpoint. Safe to call when never connected.
    async fn disconnect(&mut self);

    /// Changes recorded at the remote since this replica's last acknowledgement.
    ///
    /// An empty list means there is nothing to sync.
    async fn fetch_remote_changes(&mut self) -> SyncResult<Vec<ChangeRecord>>;

    /// Durably record `changes` at the remote, all or nothing.
    ///
    /// Pushing does not acknowledge the preceding fetch.
    async fn push_changes(&mut self, changes: &[ChangeRecord]) -> SyncResult<()>;

    /// Mark everything returned by the last fetch as received.
    ///
    /// Called once the fetched changes are committed locally; until then a
    /// new session fetches them again. A no-op when nothing was fetched.
    async fn acknowledge(&mut self) -> SyncResult<()>;

    fn is_connected(&self) -> bool;
}

/// Shared guard for adapter constructors.
pub(crate) fn ensure_protocol(expected: ProtocolKind, profile: &SyncProfile) -> SyncResult<()> {
    if profile.protocol == expected {
        Ok(())
    } else {
        Err(SyncError::ProfileMismatch {
            expected,
            actual: profile.protocol,
        })
    }
}

type AdapterFactory = Box<dyn Fn() -> Box<dyn SyncAdapter> + Send + Sync>;

/// Adapter constructors keyed by protocol.
#[derive(Default)]
pub struct AdapterRegistry {
    factories: HashMap<ProtocolKind, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in folder, removable-media and network adapters.
    pub fn with_defaults(replica_id: impl Into<String>) -> Self {
        let replica_id = replica_id.into();
        let mut registry = Self::new();

        let folder_replica = replica_id.clone();
        registry.register(ProtocolKind::LocalFolder, move || {
            Box::new(FolderSyncAdapter::new(
                FolderMode::LocalFolder,
                folder_replica.clone(),
            ))
        });

        let removable_replica = replica_id.clone();
        registry.register(ProtocolKind::RemovableMedia, move || {
            Box::new(FolderSyncAdapter::new(
                FolderMode::RemovableMedia,
                removable_replica.clone(),
            ))
        });

        registry.register(ProtocolKind::Network, move || {
            Box::new(NetworkSyncAdapter::new(replica_id.clone()))
        });

        registry
    }

    /// Register (or replace) the constructor for `protocol`.
    pub fn register<F>(&mut self, protocol: ProtocolKind, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn SyncAdapter> + Send + Sync + 'static,
    {
        if self.factories.insert(protocol, Box::new(factory)).is_some() {
            tracing::debug!("Replaced sync adapter registration for {protocol}");
        }
        self
    }

    /// Build a fresh adapter for `protocol`.
    pub fn create(&self, protocol: ProtocolKind) -> SyncResult<Box<dyn SyncAdapter>> {
        let factory = self
            .factories
            .get(&protocol)
            .ok_or(SyncError::NoAdapterForProtocol(protocol))?;
        Ok(factory())
    }

    pub fn protocols(&self) -> Vec<ProtocolKind> {
        let mut protocols = self.factories.keys().copied().collect::<Vec<_>>();
        protocols.sort();
        protocols
    }
}
