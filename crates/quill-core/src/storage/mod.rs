//! File-backed storage for media content.
//!
//! Media metadata lives in the database; the bytes live as one file per
//! media id under the blob root.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};
use crate::models::MediaId;

/// Directory of media blobs keyed by media id.
#[derive(Debug, Clone)]
pub struct MediaBlobStore {
    root: PathBuf,
}

impl MediaBlobStore {
    /// Open (and create when missing) a blob store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &MediaId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Write content for `id`, replacing any previous content.
    pub async fn write(&self, id: &MediaId, bytes: &[u8]) -> Result<()> {
        let path = self.blob_path(id);
        let staging = path.with_extension("partial");
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    /// Read content for `id`, `None` when no blob is stored.
    pub async fn read(&self, id: &MediaId) -> Result<Option<Vec<u8>>> {
        match fs::read(self.blob_path(id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(Error::Io(error)),
        }
    }

    /// Remove content for `id`. Returns whether a blob existed.
    pub async fn remove(&self, id: &MediaId) -> Result<bool> {
        match fs::remove_file(self.blob_path(id)).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(Error::Io(error)),
        }
    }
}
