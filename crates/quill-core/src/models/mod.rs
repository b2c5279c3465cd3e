//! Data models for Quill

mod conflict_log;
mod folder;
mod id;
mod media;
mod note;

pub use conflict_log::ConflictLogEntry;
pub use folder::{Folder, FolderId};
pub use media::{guess_mime_type, MediaId, MediaItem};
pub use note::{extract_tags, Note, NoteId};
