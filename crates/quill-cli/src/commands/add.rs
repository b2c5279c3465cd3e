use std::path::Path;

use quill_core::NoteId;

use crate::commands::common::{
    normalize_content, open_store, read_piped_stdin, resolve_folder_id, split_quick_capture,
};
use crate::error::CliError;

pub async fn run_add(
    title: &str,
    content_parts: &[String],
    folder: Option<&str>,
    data_dir: &Path,
) -> Result<NoteId, CliError> {
    let content = match normalize_content(&content_parts.join(" ")) {
        Some(content) => content,
        None => read_piped_stdin()?.unwrap_or_default(),
    };

    let store = open_store(data_dir).await?;
    let folder_id = resolve_folder_id(folder, &store).await?;
    let note = store.create_note(title, &content, folder_id).await?;

    println!("{}", note.id);
    Ok(note.id)
}

/// Quick capture: the first line becomes the title, the rest the body.
pub async fn run_quick_capture(parts: &[String], data_dir: &Path) -> Result<NoteId, CliError> {
    let text = normalize_content(&parts.join(" ")).ok_or(CliError::EmptyContent)?;
    let (title, body) = split_quick_capture(&text);

    let store = open_store(data_dir).await?;
    let note = store.create_note(&title, &body, None).await?;

    println!("{}", note.id);
    Ok(note.id)
}
