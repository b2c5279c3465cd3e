use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use quill_core::models::ConflictLogEntry;
use quill_core::{Folder, FolderId, LocalStore, MediaItem, Note};
use serde::Serialize;

use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub folder_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    #[serde(flatten)]
    pub entry: ConflictLogEntry,
    pub resolved_at_iso: String,
}

pub fn resolve_data_dir(cli_data_dir: Option<PathBuf>) -> PathBuf {
    cli_data_dir
        .or_else(|| env::var_os("QUILL_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(default_data_dir)
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
}

pub fn resolve_profiles_path(cli_profiles: Option<PathBuf>) -> PathBuf {
    cli_profiles
        .or_else(|| env::var_os("QUILL_PROFILES").map(PathBuf::from))
        .unwrap_or_else(crate::config_profiles::default_config_path)
}

pub async fn open_store(data_dir: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open(data_dir).await?)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_identifier(kind: &'static str, id: &str) -> Result<String, CliError> {
    normalize_content(id).ok_or(CliError::EmptyIdentifier(kind))
}

/// Read stdin when it is piped rather than a terminal.
pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

/// Split quick-capture text into a title (first line) and the remaining body.
pub fn split_quick_capture(text: &str) -> (String, String) {
    let text = text.trim();
    match text.split_once('\n') {
        Some((first, rest)) => (first.trim().to_string(), rest.trim().to_string()),
        None => (text.to_string(), String::new()),
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

/// Pick the single candidate whose id equals or starts with `query`.
pub fn resolve_by_prefix<T>(
    kind: &'static str,
    query: &str,
    candidates: Vec<T>,
    id_of: impl Fn(&T) -> String,
) -> Result<T, CliError> {
    let query = normalize_identifier(kind, query)?;
    let mut matching = Vec::new();
    for candidate in candidates {
        let id = id_of(&candidate);
        if id == query {
            return Ok(candidate);
        }
        if id.starts_with(&query) {
            matching.push((id, candidate));
        }
    }

    match matching.len() {
        0 => Err(CliError::NotFound { kind, query }),
        1 => Ok(matching.remove(0).1),
        count => {
            let options = matching
                .iter()
                .take(3)
                .map(|(id, _)| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousIdentifier(format!(
                "{kind} id prefix '{query}' matches {count} entries ({options}). Use a longer prefix."
            )))
        }
    }
}

pub async fn list_all_notes(store: &LocalStore) -> Result<Vec<Note>, CliError> {
    const PAGE_SIZE: usize = 500;

    let mut notes = Vec::new();
    let mut offset = 0usize;

    loop {
        let batch = store.list_notes(PAGE_SIZE, offset).await?;
        let count = batch.len();
        notes.extend(batch);

        if count < PAGE_SIZE {
            break;
        }
        offset += count;
    }

    Ok(notes)
}

pub async fn resolve_note(query: &str, store: &LocalStore) -> Result<Note, CliError> {
    if let Ok(note_id) = query.trim().parse() {
        if let Some(note) = store.get_note(&note_id).await? {
            return Ok(note);
        }
    }
    resolve_by_prefix("Note", query, list_all_notes(store).await?, |note| {
        note.id.to_string()
    })
}

pub async fn resolve_folder(query: &str, store: &LocalStore) -> Result<Folder, CliError> {
    resolve_by_prefix("Folder", query, store.list_folders().await?, |folder| {
        folder.id.to_string()
    })
}

pub async fn resolve_folder_id(
    query: Option<&str>,
    store: &LocalStore,
) -> Result<Option<FolderId>, CliError> {
    match query {
        Some(query) => Ok(Some(resolve_folder(query, store).await?.id)),
        None => Ok(None),
    }
}

pub async fn resolve_media(query: &str, store: &LocalStore) -> Result<MediaItem, CliError> {
    resolve_by_prefix("Media", query, store.list_media().await?, |media| {
        media.id.to_string()
    })
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let source = if note.title.trim().is_empty() {
        note.content.lines().next().unwrap_or("")
    } else {
        note.title.as_str()
    };
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(note: &Note) -> String {
    let mut tags = note.tags();
    tags.sort();
    tags.into_iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let short = short_id(&note.id.to_string());
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            let tags = render_tags(note);

            if tags.is_empty() {
                format!("{short:<13}  {preview:<40}  {relative_time}")
            } else {
                format!("{short:<13}  {preview:<40}  {relative_time:<10}  {tags}")
            }
        })
        .collect()
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    let mut tags = note.tags();
    tags.sort();

    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        folder_id: note.folder_id.map(|id| id.to_string()),
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
        tags,
    }
}

pub fn format_conflict_lines(conflicts: &[ConflictLogEntry]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<11}  {}={}  {}  local={}@{} remote={}@{}",
                format_timestamp(conflict.resolved_at),
                conflict.resolution.as_str(),
                conflict.entity_kind,
                short_id(&conflict.entity_id),
                conflict.conflict_kind.as_str(),
                conflict.local_change.as_str(),
                conflict.local_timestamp,
                conflict.remote_change.as_str(),
                conflict.remote_timestamp
            )
        })
        .collect()
}

pub fn conflict_to_item(conflict: &ConflictLogEntry) -> ConflictItem {
    ConflictItem {
        entry: conflict.clone(),
        resolved_at_iso: chrono::DateTime::from_timestamp_millis(conflict.resolved_at)
            .map_or_else(|| conflict.resolved_at.to_string(), |date| date.to_rfc3339()),
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
