//! Folder model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::id::entity_id;

entity_id!(
    /// A unique identifier for a folder
    FolderId
);

/// A folder grouping notes; folders nest through `parent_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Unique identifier
    pub id: FolderId,
    /// Display name
    pub name: String,
    /// Parent folder, `None` for top-level folders
    #[serde(default)]
    pub parent_id: Option<FolderId>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Folder {
    /// Create a new top-level folder
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: FolderId::new(),
            name: name.into(),
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Nest this folder under `parent_id`
    #[must_use]
    pub const fn with_parent(mut self, parent_id: FolderId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
