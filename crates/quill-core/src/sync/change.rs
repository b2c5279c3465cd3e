//! Change records exchanged between replicas.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Folder, MediaItem, Note};

/// Kind of entity a change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Note,
    Folder,
    Media,
}

impl EntityKind {
    pub const ALL: [Self; 3] = [Self::Folder, Self::Note, Self::Media];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Folder => "folder",
            Self::Media => "media",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "note" => Ok(Self::Note),
            "folder" => Ok(Self::Folder),
            "media" => Ok(Self::Media),
            other => Err(Error::InvalidInput(format!("Unknown entity kind: {other}"))),
        }
    }
}

/// Kind of mutation a change describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub const fn is_deletion(self) -> bool {
        matches!(self, Self::Deleted)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity snapshot carried by created/updated records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangePayload {
    Note(Note),
    Folder(Folder),
    Media {
        item: MediaItem,
        /// Media content; travels base64 encoded in serialized form.
        #[serde(
            default,
            with = "blob_base64",
            skip_serializing_if = "Option::is_none"
        )]
        blob: Option<Vec<u8>>,
    },
}

impl ChangePayload {
    pub const fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Note(_) => EntityKind::Note,
            Self::Folder(_) => EntityKind::Folder,
            Self::Media { .. } => EntityKind::Media,
        }
    }

    pub fn entity_id(&self) -> String {
        match self {
            Self::Note(note) => note.id.as_str(),
            Self::Folder(folder) => folder.id.as_str(),
            Self::Media { item, .. } => item.id.as_str(),
        }
    }

    pub const fn created_at(&self) -> i64 {
        match self {
            Self::Note(note) => note.created_at,
            Self::Folder(folder) => folder.created_at,
            Self::Media { item, .. } => item.created_at,
        }
    }

    pub const fn updated_at(&self) -> i64 {
        match self {
            Self::Note(note) => note.updated_at,
            Self::Folder(folder) => folder.updated_at,
            Self::Media { item, .. } => item.updated_at,
        }
    }

    pub fn blob(&self) -> Option<&[u8]> {
        match self {
            Self::Media { blob, .. } => blob.as_deref(),
            Self::Note(_) | Self::Folder(_) => None,
        }
    }
}

/// Identity of the entity a change touches: `(entity_kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeKey {
    pub entity_kind: EntityKind,
    pub id: String,
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_kind, self.id)
    }
}

/// One entity mutation.
///
/// Records are immutable once built. Deleted records never carry a payload;
/// created and updated records always carry one whose kind and id match the
/// record. Deserialization enforces the same rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChangeRecord")]
pub struct ChangeRecord {
    id: String,
    entity_kind: EntityKind,
    change_kind: ChangeKind,
    timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<ChangePayload>,
}

impl ChangeRecord {
    /// A record for a newly created entity.
    pub fn created(payload: ChangePayload, timestamp: i64) -> Self {
        Self::with_payload(ChangeKind::Created, payload, timestamp)
    }

    /// A record for an entity modified after creation.
    pub fn updated(payload: ChangePayload, timestamp: i64) -> Self {
        Self::with_payload(ChangeKind::Updated, payload, timestamp)
    }

    /// A deletion record; carries no payload.
    pub fn deleted(entity_kind: EntityKind, id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            entity_kind,
            change_kind: ChangeKind::Deleted,
            timestamp,
            payload: None,
        }
    }

    fn with_payload(change_kind: ChangeKind, payload: ChangePayload, timestamp: i64) -> Self {
        Self {
            id: payload.entity_id(),
            entity_kind: payload.entity_kind(),
            change_kind,
            timestamp,
            payload: Some(payload),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    pub const fn change_kind(&self) -> ChangeKind {
        self.change_kind
    }

    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub const fn payload(&self) -> Option<&ChangePayload> {
        self.payload.as_ref()
    }

    pub const fn is_deletion(&self) -> bool {
        self.change_kind.is_deletion()
    }

    pub fn key(&self) -> ChangeKey {
        ChangeKey {
            entity_kind: self.entity_kind,
            id: self.id.clone(),
        }
    }

    /// Media content attached to this record, if any.
    pub fn blob(&self) -> Option<&[u8]> {
        self.payload.as_ref().and_then(ChangePayload::blob)
    }

    /// Copy of this record with any media content stripped.
    #[must_use]
    pub fn without_blob(&self) -> Self {
        let mut record = self.clone();
        if let Some(ChangePayload::Media { blob, .. }) = record.payload.as_mut() {
            *blob = None;
        }
        record
    }

    /// Attach media content. No effect on non-media records.
    #[must_use]
    pub fn with_blob(mut self, bytes: Vec<u8>) -> Self {
        if let Some(ChangePayload::Media { blob, .. }) = self.payload.as_mut() {
            *blob = Some(bytes);
        }
        self
    }
}

#[derive(Deserialize)]
struct RawChangeRecord {
    id: String,
    entity_kind: EntityKind,
    change_kind: ChangeKind,
    timestamp: i64,
    #[serde(default)]
    payload: Option<ChangePayload>,
}

impl TryFrom<RawChangeRecord> for ChangeRecord {
    type Error = Error;

    fn try_from(raw: RawChangeRecord) -> Result<Self> {
        if raw.id.trim().is_empty() {
            return Err(Error::InvalidInput("change record id is empty".to_string()));
        }

        match (raw.change_kind, raw.payload) {
            (ChangeKind::Deleted, Some(_)) => Err(Error::InvalidInput(format!(
                "deleted record {} must not carry a payload",
                raw.id
            ))),
            (ChangeKind::Deleted, None) => {
                Ok(Self::deleted(raw.entity_kind, raw.id, raw.timestamp))
            }
            (kind, None) => Err(Error::InvalidInput(format!(
                "{kind} record {} is missing its payload",
                raw.id
            ))),
            (kind, Some(payload)) => {
                if payload.entity_kind() != raw.entity_kind {
                    return Err(Error::InvalidInput(format!(
                        "record {} declares {} but carries a {} payload",
                        raw.id,
                        raw.entity_kind,
                        payload.entity_kind()
                    )));
                }
                if payload.entity_id() != raw.id {
                    return Err(Error::InvalidInput(format!(
                        "record {} carries payload for {}",
                        raw.id,
                        payload.entity_id()
                    )));
                }
                Ok(Self::with_payload(kind, payload, raw.timestamp))
            }
        }
    }
}

/// Marker kept after an entity is removed from primary storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub entity_kind: EntityKind,
    pub id: String,
    pub deleted_at: i64,
}

impl Tombstone {
    pub fn into_record(self) -> ChangeRecord {
        ChangeRecord::deleted(self.entity_kind, self.id, self.deleted_at)
    }
}

mod blob_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        blob: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match blob {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn created_record_takes_identity_from_payload() {
        let note = Note::new("Title", "Body");
        let record = ChangeRecord::created(ChangePayload::Note(note.clone()), 10);

        assert_eq!(record.id(), note.id.as_str());
        assert_eq!(record.entity_kind(), EntityKind::Note);
        assert_eq!(record.change_kind(), ChangeKind::Created);
        assert!(!record.is_deletion());
    }

    #[test]
    fn deleted_record_has_no_payload() {
        let record = ChangeRecord::deleted(EntityKind::Folder, "abc", 5);
        assert!(record.payload().is_none());
        assert!(record.is_deletion());
        assert_eq!(record.key().to_string(), "folder:abc");
    }

    #[test]
    fn media_blob_survives_json_roundtrip() {
        let item = MediaItem::new("photo.png", "image/png", 4).unwrap();
        let record = ChangeRecord::updated(
            ChangePayload::Media {
                item,
                blob: Some(vec![0, 159, 146, 150]),
            },
            42,
        );

        let json = serde_json::to_string(&record).unwrap();
        let decoded: ChangeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.blob(), Some(&[0, 159, 146, 150][..]));
    }

    #[test]
    fn without_blob_strips_only_content() {
        let item = MediaItem::new("a.bin", "", 1).unwrap();
        let record = ChangeRecord::created(
            ChangePayload::Media {
                item: item.clone(),
                blob: Some(vec![1]),
            },
            1,
        );

        let stripped = record.without_blob();
        assert_eq!(stripped.blob(), None);
        assert_eq!(stripped.id(), item.id.as_str());
        assert_eq!(stripped.with_blob(vec![1]), record);
    }

    #[test]
    fn deserialize_rejects_deleted_record_with_payload() {
        let note = Note::new("x", "y");
        let json = serde_json::json!({
            "id": note.id.as_str(),
            "entity_kind": "note",
            "change_kind": "deleted",
            "timestamp": 1,
            "payload": { "kind": "note", "id": note.id, "title": "x", "content": "y",
                         "created_at": 1, "updated_at": 1 }
        });

        let error = serde_json::from_value::<ChangeRecord>(json).unwrap_err();
        assert!(error.to_string().contains("must not carry a payload"));
    }

    #[test]
    fn deserialize_rejects_mismatched_payload_kind() {
        let folder = Folder::new("Inbox");
        let json = serde_json::json!({
            "id": folder.id.as_str(),
            "entity_kind": "note",
            "change_kind": "updated",
            "timestamp": 1,
            "payload": { "kind": "folder", "id": folder.id, "name": "Inbox",
                         "created_at": 1, "updated_at": 1 }
        });

        assert!(serde_json::from_value::<ChangeRecord>(json).is_err());
    }

    #[test]
    fn deserialize_rejects_update_without_payload() {
        let json = serde_json::json!({
            "id": "n1",
            "entity_kind": "note",
            "change_kind": "updated",
            "timestamp": 1
        });

        assert!(serde_json::from_value::<ChangeRecord>(json).is_err());
    }

    #[test]
    fn entity_kind_parses_case_insensitively() {
        assert_eq!("Media".parse::<EntityKind>().unwrap(), EntityKind::Media);
        assert!("tag".parse::<EntityKind>().is_err());
    }
}
