use std::path::Path;

use quill_core::NoteId;

use crate::commands::common::{open_store, resolve_note};
use crate::error::CliError;

pub async fn run_delete(id: &str, data_dir: &Path) -> Result<NoteId, CliError> {
    let store = open_store(data_dir).await?;
    let note = resolve_note(id, &store).await?;

    store.delete_note(&note.id).await?;
    println!("{}", note.id);
    Ok(note.id)
}
