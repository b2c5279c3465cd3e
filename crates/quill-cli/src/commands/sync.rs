use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quill_core::sync::{
    AdapterRegistry, ConflictPolicy, SyncOptions, SyncOrchestrator, SyncReport,
};
use quill_core::LocalStore;
use serde::Serialize;

use crate::commands::common::{
    conflict_to_item, format_conflict_lines, format_timestamp, open_store, ConflictItem,
};
use crate::config_profiles::ProfilesConfig;
use crate::error::CliError;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Serialize)]
pub struct ProfileStatusItem {
    pub name: String,
    pub id: String,
    pub protocol: String,
    pub last_sync_at: Option<i64>,
}

pub async fn run_sync(
    profile_name: &str,
    timeout: Option<u64>,
    policy: ConflictPolicy,
    profiles_path: &Path,
    data_dir: &Path,
) -> Result<SyncReport, CliError> {
    let config = ProfilesConfig::load_from_path(profiles_path)?;
    let profile = config.profile(profile_name)?;

    let store = Arc::new(open_store(data_dir).await?);
    let orchestrator = build_orchestrator(&store, policy).await?;

    let options = timeout.map_or_else(SyncOptions::default, |seconds| {
        SyncOptions::with_deadline(Duration::from_secs(seconds))
    });
    let report = orchestrator.synchronize(profile, options).await?;

    for line in format_report(&profile.name, &report) {
        println!("{line}");
    }
    Ok(report)
}

pub async fn build_orchestrator(
    store: &Arc<LocalStore>,
    policy: ConflictPolicy,
) -> Result<SyncOrchestrator, CliError> {
    let registry = AdapterRegistry::with_defaults(store.replica_id().await?);
    let orchestrator = SyncOrchestrator::load(registry, store.clone(), store.clone()).await?;
    Ok(orchestrator.with_policy(policy))
}

pub fn format_report(profile_name: &str, report: &SyncReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.is_noop() {
        lines.push(format!("Profile '{profile_name}' is already up to date"));
    } else {
        lines.push(format!(
            "Synced '{profile_name}' over {} in {:.2}s: {} applied, {} pushed, {} conflict(s), {} settled deletion(s)",
            report.protocol,
            report.elapsed.as_secs_f64(),
            report.applied.len(),
            report.pushed.len(),
            report.conflicts.len(),
            report.settled
        ));
    }

    for conflict in &report.conflicts {
        lines.push(format!(
            "  {}  {}  -> {}",
            conflict.key(),
            conflict.kind.as_str(),
            conflict.resolution.as_str()
        ));
    }
    lines
}

pub async fn run_sync_status(
    as_json: bool,
    profiles_path: &Path,
    data_dir: &Path,
) -> Result<(), CliError> {
    let config = ProfilesConfig::load_from_path(profiles_path)?;
    let store = open_store(data_dir).await?;
    let checkpoints = store.list_checkpoints().await?;

    let items = config
        .profiles
        .values()
        .map(|profile| ProfileStatusItem {
            name: profile.name.clone(),
            id: profile.id.clone(),
            protocol: profile.protocol.to_string(),
            last_sync_at: checkpoints.get(&profile.id).copied(),
        })
        .collect::<Vec<_>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No sync profiles configured.");
        return Ok(());
    }

    for item in items {
        let last_sync = item
            .last_sync_at
            .map_or_else(|| "never".to_string(), format_timestamp);
        println!("{:<16}  {:<15}  {last_sync}", item.name, item.protocol);
    }
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    data_dir: &Path,
) -> Result<(), CliError> {
    let store = open_store(data_dir).await?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_reset(
    profile_name: &str,
    profiles_path: &Path,
    data_dir: &Path,
) -> Result<bool, CliError> {
    let config = ProfilesConfig::load_from_path(profiles_path)?;
    let profile = config.profile(profile_name)?;

    let store = open_store(data_dir).await?;
    let cleared = store.reset_checkpoint(&profile.id).await?;
    if cleared {
        println!("Checkpoint for '{}' cleared", profile.name);
    } else {
        println!("Profile '{}' has never synced", profile.name);
    }
    Ok(cleared)
}

pub async fn run_sync_prune(days: u32, data_dir: &Path) -> Result<u64, CliError> {
    let store = open_store(data_dir).await?;
    let removed = store.prune_tombstones(i64::from(days) * DAY_MS).await?;

    println!("Pruned {removed} deletion marker(s)");
    Ok(removed)
}
