//! quill-core - Core library for Quill
//!
//! This crate contains the note, folder and media models, the libSQL-backed
//! local store, and the synchronization engine used by the Quill CLI.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Folder, FolderId, MediaId, MediaItem, Note, NoteId};
pub use services::{Backup, LocalStore, RestoreSummary};
