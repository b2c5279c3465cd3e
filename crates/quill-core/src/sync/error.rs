//! Sync session error taxonomy.

use thiserror::Error;

use super::profile::ProtocolKind;

/// Result type alias for sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Errors that end a sync session.
///
/// Every variant is session-fatal and none is retried automatically. A
/// failed session never advances the profile checkpoint, so re-running it
/// re-delivers the same change window.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The profile was handed to an adapter for a different protocol
    #[error("Profile uses protocol {actual} but the adapter handles {expected}")]
    ProfileMismatch {
        expected: ProtocolKind,
        actual: ProtocolKind,
    },

    /// The remote path or host cannot be reached
    #[error("Sync endpoint unavailable: {0}")]
    EndpointUnavailable(String),

    /// Connecting the adapter failed
    #[error("Failed to connect: {0}")]
    ConnectFailed(#[source] Box<SyncError>),

    /// The remote did not durably record every pushed change
    #[error("Push incomplete: {0}")]
    PushIncomplete(String),

    /// No adapter is registered for the profile's protocol
    #[error("No sync adapter registered for protocol {0}")]
    NoAdapterForProtocol(ProtocolKind),

    /// The profile failed validation
    #[error("Invalid sync profile configuration: {0}")]
    ConfigurationInvalid(String),

    /// Another session for the same profile is running
    #[error("A sync session for profile '{0}' is already running")]
    SessionInProgress(String),

    /// The local store failed while collecting or applying changes
    #[error("Local store error: {0}")]
    Store(#[from] crate::Error),
}

impl SyncError {
    /// The innermost error, looking through `ConnectFailed`.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::ConnectFailed(inner) => inner.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_connect_failures() {
        let error = SyncError::ConnectFailed(Box::new(SyncError::EndpointUnavailable(
            "/media/usb0 is not mounted".to_string(),
        )));

        assert!(matches!(
            error.root_cause(),
            SyncError::EndpointUnavailable(_)
        ));
        assert!(error.to_string().contains("not mounted"));
    }
}
