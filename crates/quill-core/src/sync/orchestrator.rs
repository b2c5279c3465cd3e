//! Sync session orchestration.
//!
//! A session connects the profile's adapter, fetches the remote change set,
//! collects local changes since the profile checkpoint and resolves
//! conflicts. It then pushes the local side, commits the remote side and the
//! conflict log locally in one unit, acknowledges the fetch and only then
//! advances the checkpoint. Any failure before the local commit leaves the
//! local store untouched. The adapter is disconnected on every path.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::adapter::{AdapterRegistry, SyncAdapter};
use super::change::{ChangeKey, ChangeRecord, EntityKind};
use super::collector::{latest_per_entity, LocalChangeCollector};
use super::conflict::{detect, settled_deletions, ConflictPolicy, ConflictResolver, Resolution, SyncConflict};
use super::error::{SyncError, SyncResult};
use super::profile::{ProtocolKind, SyncProfile};
use super::store::{CheckpointStore, EntityStore};
use crate::util::sync_baseline;

/// Per-session knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Upper bound for the adapter and collection steps of a session.
    ///
    /// The local commit and the disconnect always run to completion.
    pub deadline: Option<Duration>,
}

impl SyncOptions {
    pub const fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }
}

/// Where a profile's session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Collecting,
    Resolving,
    Applying,
    Disconnecting,
    Failed,
}

/// Outcome of a successful session.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub profile_id: String,
    pub protocol: ProtocolKind,
    /// Checkpoint recorded for the profile
    pub baseline: i64,
    /// Remote changes applied to the local store
    pub applied: Vec<ChangeKey>,
    /// Local changes pushed to the remote
    pub pushed: Vec<ChangeKey>,
    pub conflicts: Vec<SyncConflict>,
    /// Entities deleted on both sides
    pub settled: usize,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.pushed.is_empty() && self.conflicts.is_empty()
    }
}

/// Runs sync sessions against registered adapters.
///
/// Shareable across tasks; sessions for different profiles run in parallel,
/// a second session for a busy profile is rejected.
pub struct SyncOrchestrator {
    registry: AdapterRegistry,
    store: Arc<dyn EntityStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    resolver: ConflictResolver,
    last_sync: Mutex<HashMap<String, i64>>,
    states: Mutex<HashMap<String, SessionState>>,
    in_flight: Mutex<HashSet<String>>,
}

impl SyncOrchestrator {
    pub fn new(
        registry: AdapterRegistry,
        store: Arc<dyn EntityStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            registry,
            store,
            checkpoints,
            resolver: ConflictResolver::default(),
            last_sync: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Build an orchestrator seeded with persisted checkpoints.
    pub async fn load(
        registry: AdapterRegistry,
        store: Arc<dyn EntityStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> SyncResult<Self> {
        let loaded = checkpoints.load_checkpoints().await?;
        tracing::debug!("Loaded {} sync checkpoint(s)", loaded.len());
        let orchestrator = Self::new(registry, store, checkpoints);
        *orchestrator.lock_last_sync() = loaded;
        Ok(orchestrator)
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.resolver = ConflictResolver::new(policy);
        self
    }

    /// Last successful sync of a profile, `None` when it never completed.
    pub fn last_sync(&self, profile_id: &str) -> Option<i64> {
        self.lock_last_sync().get(profile_id).copied()
    }

    pub fn session_state(&self, profile_id: &str) -> SessionState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(profile_id)
            .copied()
            .unwrap_or_default()
    }

    /// Run one sync session for `profile`.
    pub async fn synchronize(
        &self,
        profile: &SyncProfile,
        options: SyncOptions,
    ) -> SyncResult<SyncReport> {
        profile.validate()?;
        let _guard = self.begin(&profile.id)?;

        let started = std::time::Instant::now();
        let deadline = options.deadline.map(|limit| Instant::now() + limit);

        let mut adapter = match self.registry.create(profile.protocol) {
            Ok(adapter) => adapter,
            Err(error) => return Err(self.fail(profile, error)),
        };

        tracing::info!(
            "Starting sync for profile '{}' ({})",
            profile.name,
            profile.protocol
        );
        self.set_state(&profile.id, SessionState::Connecting);
        let connected = bounded(deadline, "connecting", async {
            adapter
                .connect(profile)
                .await
                .map_err(|error| SyncError::ConnectFailed(Box::new(error)))
        })
        .await;

        let outcome = match connected {
            Ok(()) => self.exchange(profile, adapter.as_mut(), deadline).await,
            Err(error) => Err(error),
        };

        self.set_state(&profile.id, SessionState::Disconnecting);
        adapter.disconnect().await;

        match outcome {
            Ok(mut report) => {
                report.elapsed = started.elapsed();
                self.set_state(&profile.id, SessionState::Idle);
                tracing::info!(
                    "Sync for profile '{}' finished: {} applied, {} pushed, {} conflict(s)",
                    profile.name,
                    report.applied.len(),
                    report.pushed.len(),
                    report.conflicts.len()
                );
                Ok(report)
            }
            Err(error) => Err(self.fail(profile, error)),
        }
    }

    async fn exchange(
        &self,
        profile: &SyncProfile,
        adapter: &mut dyn SyncAdapter,
        deadline: Option<Instant>,
    ) -> SyncResult<SyncReport> {
        self.set_state(&profile.id, SessionState::Collecting);
        let remote = bounded(
            deadline,
            "fetching remote changes",
            adapter.fetch_remote_changes(),
        )
        .await?;
        let remote = latest_per_entity(remote);

        let since = self.last_sync(&profile.id);
        let baseline = sync_baseline();
        let local = bounded(deadline, "collecting local changes", async {
            Ok(LocalChangeCollector::new(self.store.as_ref())
                .collect_since(since)
                .await?)
        })
        .await?;
        tracing::debug!(
            "Profile '{}': {} remote and {} local change(s)",
            profile.name,
            remote.len(),
            local.len()
        );

        self.set_state(&profile.id, SessionState::Resolving);
        let mut conflicts = detect(&local, &remote);
        self.resolver.resolve_all(&mut conflicts);
        let settled = settled_deletions(&local, &remote);
        let decisions = conflicts
            .iter()
            .map(|conflict| (conflict.key(), conflict.resolution))
            .collect::<HashMap<_, _>>();

        let mut to_apply = remote
            .into_iter()
            .filter(|record| {
                let key = record.key();
                !settled.contains(&key)
                    && decisions
                        .get(&key)
                        .map_or(true, |resolution| *resolution == Resolution::KeepRemote)
            })
            .collect::<Vec<_>>();
        to_apply.sort_by_key(apply_order);

        let to_push = local
            .into_iter()
            .filter(|record| {
                let key = record.key();
                !settled.contains(&key)
                    && decisions
                        .get(&key)
                        .map_or(true, |resolution| *resolution == Resolution::KeepLocal)
            })
            .collect::<Vec<_>>();

        self.set_state(&profile.id, SessionState::Applying);
        bounded(
            deadline,
            "pushing local changes",
            adapter.push_changes(&to_push),
        )
        .await?;

        self.store
            .apply_remote(&profile.id, &to_apply, &conflicts)
            .await?;
        for record in &to_apply {
            tracing::debug!("Applied remote {} of {}", record.change_kind(), record.key());
        }

        if let Err(error) = bounded(
            deadline,
            "acknowledging remote changes",
            adapter.acknowledge(),
        )
        .await
        {
            tracing::warn!(
                "Profile '{}': remote changes were applied but not acknowledged ({error}); they will be fetched again",
                profile.name
            );
            return Err(error);
        }

        self.checkpoints
            .save_checkpoint(&profile.id, baseline)
            .await?;
        self.lock_last_sync().insert(profile.id.clone(), baseline);

        Ok(SyncReport {
            profile_id: profile.id.clone(),
            protocol: profile.protocol,
            baseline,
            applied: to_apply.iter().map(ChangeRecord::key).collect(),
            pushed: to_push.iter().map(ChangeRecord::key).collect(),
            conflicts,
            settled: settled.len(),
            elapsed: Duration::ZERO,
        })
    }

    fn begin(&self, profile_id: &str) -> SyncResult<InFlight<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(profile_id.to_string()) {
            return Err(SyncError::SessionInProgress(profile_id.to_string()));
        }
        Ok(InFlight {
            set: &self.in_flight,
            profile_id: profile_id.to_string(),
        })
    }

    fn fail(&self, profile: &SyncProfile, error: SyncError) -> SyncError {
        self.set_state(&profile.id, SessionState::Failed);
        tracing::warn!("Sync for profile '{}' failed: {error}", profile.name);
        error
    }

    fn set_state(&self, profile_id: &str, state: SessionState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile_id.to_string(), state);
    }

    fn lock_last_sync(&self) -> std::sync::MutexGuard<'_, HashMap<String, i64>> {
        self.last_sync.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the single-flight slot of a profile.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    profile_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.profile_id);
    }
}

/// Parents are created before children and removed after them.
fn apply_order(record: &ChangeRecord) -> (bool, usize) {
    let rank = EntityKind::ALL
        .iter()
        .position(|kind| *kind == record.entity_kind())
        .unwrap_or_default();
    if record.is_deletion() {
        (true, EntityKind::ALL.len() - rank)
    } else {
        (false, rank)
    }
}

async fn bounded<T>(
    deadline: Option<Instant>,
    step: &str,
    future: impl Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    match deadline {
        None => future.await,
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_| SyncError::EndpointUnavailable(format!("deadline exceeded while {step}")))?,
    }
}
