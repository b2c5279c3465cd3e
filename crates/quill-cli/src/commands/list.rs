use std::path::Path;

use quill_core::Note;

use crate::commands::common::{
    format_note_lines, note_to_list_item, open_store, resolve_folder, resolve_note, NoteListItem,
};
use crate::error::CliError;

pub async fn list_notes(
    limit: usize,
    tag: Option<&str>,
    folder: Option<&str>,
    data_dir: &Path,
) -> Result<Vec<Note>, CliError> {
    let store = open_store(data_dir).await?;
    if let Some(tag_name) = tag {
        return Ok(store.list_notes_by_tag(tag_name, limit).await?);
    }
    if let Some(folder_query) = folder {
        let folder = resolve_folder(folder_query, &store).await?;
        let mut notes = store.list_notes_in_folder(&folder.id).await?;
        notes.truncate(limit);
        return Ok(notes);
    }
    Ok(store.list_notes(limit, 0).await?)
}

pub async fn search_notes(
    query: &str,
    limit: usize,
    data_dir: &Path,
) -> Result<Vec<Note>, CliError> {
    let store = open_store(data_dir).await?;
    Ok(store.search_notes(query, limit).await?)
}

pub async fn run_search(
    query: &str,
    limit: usize,
    as_json: bool,
    data_dir: &Path,
) -> Result<(), CliError> {
    let notes = search_notes(query, limit, data_dir).await?;

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if notes.is_empty() {
        eprintln!("No notes match '{}'", query.trim());
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_list(
    limit: usize,
    tag: Option<&str>,
    folder: Option<&str>,
    as_json: bool,
    data_dir: &Path,
) -> Result<(), CliError> {
    let notes = list_notes(limit, tag, folder, data_dir).await?;

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_show(id: &str, data_dir: &Path) -> Result<(), CliError> {
    let store = open_store(data_dir).await?;
    let note = resolve_note(id, &store).await?;

    println!("# {}", note.title);
    if !note.content.is_empty() {
        println!();
        println!("{}", note.content);
    }
    Ok(())
}
