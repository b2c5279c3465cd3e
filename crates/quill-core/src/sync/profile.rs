//! Sync profile configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{SyncError, SyncResult};

/// Setting keys understood by the built-in adapters.
pub mod keys {
    /// Sync folder for `LocalFolder` profiles
    pub const PATH: &str = "path";
    /// Mount point of the removable device
    pub const DEVICE_PATH: &str = "device_path";
    /// Full base URL of a sync server
    pub const SERVER_URL: &str = "server_url";
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    /// Optional bearer token for network profiles
    pub const AUTH_TOKEN: &str = "auth_token";
}

/// Physical medium a profile syncs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    RemovableMedia,
    Network,
    LocalFolder,
}

impl ProtocolKind {
    pub const ALL: [Self; 3] = [Self::RemovableMedia, Self::Network, Self::LocalFolder];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemovableMedia => "removable_media",
            Self::Network => "network",
            Self::LocalFolder => "local_folder",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "removable_media" | "removable" | "usb" => Ok(Self::RemovableMedia),
            "network" | "http" => Ok(Self::Network),
            "local_folder" | "folder" => Ok(Self::LocalFolder),
            other => Err(SyncError::ConfigurationInvalid(format!(
                "unknown protocol '{other}'"
            ))),
        }
    }
}

/// One remote endpoint and the settings needed to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProfile {
    pub id: String,
    pub name: String,
    pub protocol: ProtocolKind,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl SyncProfile {
    /// Create a profile with a fresh id and no settings.
    pub fn new(name: impl Into<String>, protocol: ProtocolKind) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            protocol,
            settings: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Trimmed, non-empty setting value.
    pub fn setting(&self, key: &str) -> Option<String> {
        self.settings
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Check that every setting the protocol requires is present and well formed.
    pub fn validate(&self) -> SyncResult<()> {
        if self.id.trim().is_empty() {
            return Err(SyncError::ConfigurationInvalid(
                "profile id must not be empty".to_string(),
            ));
        }

        match self.protocol {
            ProtocolKind::LocalFolder => {
                self.require(keys::PATH)?;
            }
            ProtocolKind::RemovableMedia => {
                if self.device_path().is_none() {
                    return Err(self.missing(keys::DEVICE_PATH));
                }
            }
            ProtocolKind::Network => {
                self.network_base_url()?;
            }
        }
        Ok(())
    }

    /// Mount point for removable-media profiles (`device_path`, falling back to `path`).
    pub fn device_path(&self) -> Option<PathBuf> {
        self.setting(keys::DEVICE_PATH)
            .or_else(|| self.setting(keys::PATH))
            .map(PathBuf::from)
    }

    /// Sync folder for local-folder profiles.
    pub fn folder_path(&self) -> Option<PathBuf> {
        self.setting(keys::PATH).map(PathBuf::from)
    }

    /// Base URL for network profiles, from `server_url` or `host` + `port`.
    pub fn network_base_url(&self) -> SyncResult<String> {
        if let Some(url) = self.setting(keys::SERVER_URL) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "profile '{}': server_url must include http:// or https://",
                    self.name
                )));
            }
            return Ok(url.trim_end_matches('/').to_string());
        }

        let (Some(host), Some(port)) = (self.setting(keys::HOST), self.setting(keys::PORT)) else {
            return Err(SyncError::ConfigurationInvalid(format!(
                "profile '{}' requires server_url or both host and port",
                self.name
            )));
        };
        let port = port.parse::<u16>().map_err(|_| {
            SyncError::ConfigurationInvalid(format!(
                "profile '{}': port '{port}' is not a valid port number",
                self.name
            ))
        })?;
        Ok(format!("http://{host}:{port}"))
    }

    fn require(&self, key: &str) -> SyncResult<String> {
        self.setting(key).ok_or_else(|| self.missing(key))
    }

    fn missing(&self, key: &str) -> SyncError {
        SyncError::ConfigurationInvalid(format!(
            "profile '{}' ({}) is missing required setting '{key}'",
            self.name, self.protocol
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_folder_requires_path() {
        let profile = SyncProfile::new("Backup", ProtocolKind::LocalFolder);
        let error = profile.validate().unwrap_err();
        assert!(matches!(error, SyncError::ConfigurationInvalid(ref msg) if msg.contains("'path'")));

        let profile = profile.with_setting(keys::PATH, "/tmp/quill-sync");
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn removable_media_accepts_device_path_or_path() {
        let base = SyncProfile::new("USB", ProtocolKind::RemovableMedia);
        assert!(base.validate().is_err());
        assert!(base
            .clone()
            .with_setting(keys::DEVICE_PATH, "/media/usb0")
            .validate()
            .is_ok());
        assert!(base.with_setting(keys::PATH, "/media/usb0").validate().is_ok());
    }

    #[test]
    fn network_requires_url_or_host_and_port() {
        let base = SyncProfile::new("Home server", ProtocolKind::Network);
        assert!(base.validate().is_err());
        assert!(base.clone().with_setting(keys::HOST, "nas.local").validate().is_err());

        let by_host = base
            .clone()
            .with_setting(keys::HOST, "nas.local")
            .with_setting(keys::PORT, "8080");
        assert_eq!(by_host.network_base_url().unwrap(), "http://nas.local:8080");

        let by_url = base.with_setting(keys::SERVER_URL, "https://sync.example.com/");
        assert_eq!(by_url.network_base_url().unwrap(), "https://sync.example.com");
    }

    #[test]
    fn network_rejects_bad_port_and_scheme() {
        let bad_port = SyncProfile::new("s", ProtocolKind::Network)
            .with_setting(keys::HOST, "nas.local")
            .with_setting(keys::PORT, "99999");
        assert!(bad_port.validate().is_err());

        let bad_scheme = SyncProfile::new("s", ProtocolKind::Network)
            .with_setting(keys::SERVER_URL, "ftp://nas.local");
        assert!(bad_scheme.validate().is_err());
    }

    #[test]
    fn blank_settings_count_as_missing() {
        let profile =
            SyncProfile::new("Backup", ProtocolKind::LocalFolder).with_setting(keys::PATH, "   ");
        assert!(profile.validate().is_err());

        let profile = profile.with_setting(keys::PATH, " /media/usb0 ");
        assert_eq!(profile.setting(keys::PATH).as_deref(), Some("/media/usb0"));
    }

    #[test]
    fn protocol_parses_aliases() {
        assert_eq!("usb".parse::<ProtocolKind>().unwrap(), ProtocolKind::RemovableMedia);
        assert_eq!("local-folder".parse::<ProtocolKind>().unwrap(), ProtocolKind::LocalFolder);
        assert!("carrier-pigeon".parse::<ProtocolKind>().is_err());
    }
}
