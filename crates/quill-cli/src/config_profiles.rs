//! Persistent sync profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use quill_core::sync::SyncProfile;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "profiles.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    /// Profiles keyed by their user-facing name
    #[serde(default)]
    pub profiles: BTreeMap<String, SyncProfile>,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            profiles: BTreeMap::new(),
        }
    }
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
        .join(CONFIG_FILE_NAME)
}

pub fn normalize_profile_name(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl ProfilesConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!(
                "Failed to read profiles at {}: {error}",
                path.display()
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!(
                "Failed to parse profiles at {}: {error}",
                path.display()
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                CliError::Config(format!(
                    "Failed to create config directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized).map_err(|error| {
            CliError::Config(format!(
                "Failed to write profiles at {}: {error}",
                path.display()
            ))
        })
    }

    pub fn profile(&self, name: &str) -> Result<&SyncProfile, CliError> {
        let name = name.trim();
        self.profiles
            .get(name)
            .ok_or_else(|| CliError::UnknownProfile(name.to_string()))
    }

    /// Validate and store a new profile under its name.
    pub fn insert(&mut self, profile: SyncProfile) -> Result<&SyncProfile, CliError> {
        let name = normalize_profile_name(&profile.name)
            .ok_or_else(|| CliError::Config("Profile name cannot be empty".to_string()))?;
        if self.profiles.contains_key(&name) {
            return Err(CliError::DuplicateProfile(name));
        }
        profile.validate()?;

        Ok(self
            .profiles
            .entry(name.clone())
            .or_insert(SyncProfile { name, ..profile }))
    }

    pub fn remove(&mut self, name: &str) -> Result<SyncProfile, CliError> {
        let name = name.trim();
        self.profiles
            .remove(name)
            .ok_or_else(|| CliError::UnknownProfile(name.to_string()))
    }

    fn normalize(&mut self) {
        for profile in self.profiles.values_mut() {
            profile.settings = std::mem::take(&mut profile.settings)
                .into_iter()
                .filter_map(|(key, value)| {
                    let key = key.trim().to_string();
                    let value = value.trim().to_string();
                    (!key.is_empty() && !value.is_empty()).then_some((key, value))
                })
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::sync::ProtocolKind;

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(" "), None);
        assert_eq!(normalize_profile_name(" usb "), Some("usb".to_string()));
    }

    #[test]
    fn missing_file_loads_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProfilesConfig::load_from_path(&dir.path().join("none.json")).unwrap();
        assert_eq!(config, ProfilesConfig::default());
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = ProfilesConfig::default();
        let profile = SyncProfile::new("share", ProtocolKind::LocalFolder)
            .with_setting("path", " /mnt/share/quill ")
            .with_setting("note", "   ");
        let id = config.insert(profile).unwrap().id.clone();

        config.save_to_path(&path).unwrap();
        let loaded = ProfilesConfig::load_from_path(&path).unwrap();

        let stored = loaded.profile("share").unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(
            stored.settings.get("path").map(String::as_str),
            Some("/mnt/share/quill")
        );
        assert!(!stored.settings.contains_key("note"));
    }

    #[test]
    fn insert_rejects_duplicates_and_invalid_profiles() {
        let mut config = ProfilesConfig::default();
        config
            .insert(
                SyncProfile::new("usb", ProtocolKind::RemovableMedia)
                    .with_setting("device_path", "/media/usb0"),
            )
            .unwrap();

        let duplicate = config.insert(
            SyncProfile::new("usb", ProtocolKind::RemovableMedia)
                .with_setting("device_path", "/media/usb1"),
        );
        assert!(matches!(duplicate, Err(CliError::DuplicateProfile(name)) if name == "usb"));

        let invalid = config.insert(SyncProfile::new("server", ProtocolKind::Network));
        assert!(matches!(invalid, Err(CliError::Sync(_))));
        assert_eq!(config.profiles.len(), 1);
    }

    #[test]
    fn remove_unknown_profile_fails() {
        let mut config = ProfilesConfig::default();
        assert!(matches!(
            config.remove("ghost"),
            Err(CliError::UnknownProfile(name)) if name == "ghost"
        ));
    }
}
