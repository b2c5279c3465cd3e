//! Media item model
//!
//! Only metadata lives here; the binary content is kept by
//! [`crate::storage::MediaBlobStore`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::id::entity_id;

entity_id!(
    /// A unique identifier for a media item
    MediaId
);

/// Metadata for an imported media file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Unique identifier
    pub id: MediaId,
    /// Original file name
    pub file_name: String,
    /// Content MIME type
    pub mime_type: String,
    /// Content size in bytes
    pub size_bytes: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl MediaItem {
    /// Create media metadata for content of `size_bytes` bytes.
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: i64,
    ) -> Result<Self> {
        let file_name = file_name.into().trim().to_string();
        if file_name.is_empty() {
            return Err(Error::InvalidInput(
                "Media file name cannot be empty".to_string(),
            ));
        }
        if size_bytes < 0 {
            return Err(Error::InvalidInput(
                "Media size cannot be negative".to_string(),
            ));
        }

        let mime_type = mime_type.into().trim().to_string();
        let mime_type = if mime_type.is_empty() {
            guess_mime_type(&file_name).to_string()
        } else {
            mime_type
        };

        let now = chrono::Utc::now().timestamp_millis();
        Ok(Self {
            id: MediaId::new(),
            file_name,
            mime_type,
            size_bytes,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Best-effort MIME type from a file extension.
pub fn guess_mime_type(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "txt" | "md" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_name_and_guesses_mime() {
        let item = MediaItem::new("  photo.JPG ", "", 42).unwrap();
        assert_eq!(item.file_name, "photo.JPG");
        assert_eq!(item.mime_type, "image/jpeg");
        assert_eq!(item.size_bytes, 42);
    }

    #[test]
    fn new_rejects_empty_name_and_negative_size() {
        assert!(MediaItem::new("  ", "image/png", 1).is_err());
        assert!(MediaItem::new("a.png", "image/png", -1).is_err());
    }

    #[test]
    fn guess_mime_type_defaults_to_octet_stream() {
        assert_eq!(guess_mime_type("archive"), "application/octet-stream");
        assert_eq!(guess_mime_type("notes.md"), "text/plain");
    }
}
