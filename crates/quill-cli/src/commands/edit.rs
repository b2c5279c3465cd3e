use std::path::Path;

use quill_core::Note;

use crate::commands::common::{open_store, resolve_folder_id, resolve_note};
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    title: Option<&str>,
    content: Option<&str>,
    data_dir: &Path,
) -> Result<Note, CliError> {
    if title.is_none() && content.is_none() {
        return Err(CliError::NothingToUpdate);
    }

    let store = open_store(data_dir).await?;
    let note = resolve_note(id, &store).await?;
    if unchanged(title, &note.title) && unchanged(content, &note.content) {
        println!("{}", note.id);
        return Ok(note);
    }

    let updated = store.update_note(&note.id, title, content).await?;
    println!("{}", updated.id);
    Ok(updated)
}

pub async fn run_move(id: &str, folder: Option<&str>, data_dir: &Path) -> Result<Note, CliError> {
    let store = open_store(data_dir).await?;
    let note = resolve_note(id, &store).await?;
    let folder_id = resolve_folder_id(folder, &store).await?;

    let moved = store.move_note(&note.id, folder_id).await?;
    println!("{}", moved.id);
    Ok(moved)
}

fn unchanged(value: Option<&str>, current: &str) -> bool {
    value.is_none() || value == Some(current)
}
