//! Service layer shared across clients.

mod backup;
mod local_store;

pub use backup::{Backup, RestoreSummary, BACKUP_FORMAT_VERSION};
pub use local_store::{LocalStore, DATABASE_FILE, MEDIA_DIR, TOMBSTONE_RETENTION_MS};
