use std::io;

use quill_core::sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] quill_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("{0} ID cannot be empty")]
    EmptyIdentifier(&'static str),
    #[error("{kind} not found for id/prefix: {query}")]
    NotFound { kind: &'static str, query: String },
    #[error("{0}")]
    AmbiguousIdentifier(String),
    #[error("Nothing to change: pass --title and/or --content")]
    NothingToUpdate,
    #[error("Sync profile not found: {0}")]
    UnknownProfile(String),
    #[error("Sync profile already exists: {0}")]
    DuplicateProfile(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
