use std::path::Path;

use quill_core::sync::{ProtocolKind, SyncProfile};

use crate::commands::common::open_store;
use crate::config_profiles::ProfilesConfig;
use crate::error::CliError;

pub fn run_profile_add(
    name: &str,
    protocol: ProtocolKind,
    settings: &[(String, String)],
    profiles_path: &Path,
) -> Result<SyncProfile, CliError> {
    let mut config = ProfilesConfig::load_from_path(profiles_path)?;
    let profile = settings
        .iter()
        .fold(SyncProfile::new(name, protocol), |profile, (key, value)| {
            profile.with_setting(key, value)
        });

    let stored = config.insert(profile)?.clone();
    config.save_to_path(profiles_path)?;
    tracing::info!("Added {} profile '{}'", stored.protocol, stored.name);

    println!("{}", stored.name);
    Ok(stored)
}

pub fn run_profile_list(as_json: bool, profiles_path: &Path) -> Result<(), CliError> {
    let config = ProfilesConfig::load_from_path(profiles_path)?;
    let profiles = config.profiles.values().collect::<Vec<_>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    if profiles.is_empty() {
        println!("No sync profiles configured.");
        return Ok(());
    }

    for profile in profiles {
        let settings = profile
            .settings
            .iter()
            .map(|(key, value)| format!("{key}={}", redact_setting(key, value)))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{:<16}  {:<15}  {settings}", profile.name, profile.protocol);
    }
    Ok(())
}

pub async fn run_profile_remove(
    name: &str,
    profiles_path: &Path,
    data_dir: &Path,
) -> Result<SyncProfile, CliError> {
    let mut config = ProfilesConfig::load_from_path(profiles_path)?;
    let removed = config.remove(name)?;
    config.save_to_path(profiles_path)?;

    let store = open_store(data_dir).await?;
    store.reset_checkpoint(&removed.id).await?;

    println!("{}", removed.name);
    Ok(removed)
}

pub fn redact_setting<'a>(key: &str, value: &'a str) -> &'a str {
    if key == quill_core::sync::profile::keys::AUTH_TOKEN {
        "********"
    } else {
        value
    }
}
