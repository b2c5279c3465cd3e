use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use quill_core::{Folder, FolderId};

use crate::commands::common::{open_store, resolve_folder, resolve_folder_id, short_id};
use crate::error::CliError;

pub async fn run_folder_add(
    name: &str,
    parent: Option<&str>,
    data_dir: &Path,
) -> Result<FolderId, CliError> {
    let store = open_store(data_dir).await?;
    let parent_id = resolve_folder_id(parent, &store).await?;
    let folder = store.create_folder(name, parent_id).await?;

    println!("{}", folder.id);
    Ok(folder.id)
}

pub async fn run_folder_list(as_json: bool, data_dir: &Path) -> Result<(), CliError> {
    let store = open_store(data_dir).await?;
    let folders = store.list_folders().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&folders)?);
    } else {
        for line in format_folder_tree(&folders) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_folder_rename(id: &str, name: &str, data_dir: &Path) -> Result<(), CliError> {
    let store = open_store(data_dir).await?;
    let folder = resolve_folder(id, &store).await?;
    let renamed = store.rename_folder(&folder.id, name).await?;

    println!("{}", renamed.id);
    Ok(())
}

pub async fn run_folder_move(
    id: &str,
    parent: Option<&str>,
    data_dir: &Path,
) -> Result<Folder, CliError> {
    let store = open_store(data_dir).await?;
    let folder = resolve_folder(id, &store).await?;
    let parent_id = resolve_folder_id(parent, &store).await?;
    let moved = store.move_folder(&folder.id, parent_id).await?;

    println!("{}", moved.id);
    Ok(moved)
}

pub async fn run_folder_delete(id: &str, data_dir: &Path) -> Result<FolderId, CliError> {
    let store = open_store(data_dir).await?;
    let folder = resolve_folder(id, &store).await?;
    store.delete_folder(&folder.id).await?;

    println!("{}", folder.id);
    Ok(folder.id)
}

/// Render folders as an indented tree, children sorted by name.
///
/// Folders whose parent is unknown (for example after a sync orphaned them)
/// are shown at the top level.
pub fn format_folder_tree(folders: &[Folder]) -> Vec<String> {
    let known = folders.iter().map(|folder| folder.id).collect::<HashSet<_>>();
    let mut children: BTreeMap<Option<FolderId>, Vec<&Folder>> = BTreeMap::new();
    for folder in folders {
        let parent = folder.parent_id.filter(|parent| known.contains(parent));
        children.entry(parent).or_default().push(folder);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    }

    let mut lines = Vec::with_capacity(folders.len());
    let mut visited = HashSet::new();
    let mut stack = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|folder| (*folder, 0usize)).collect())
        .unwrap_or_else(Vec::new);

    while let Some((folder, depth)) = stack.pop() {
        if !visited.insert(folder.id) {
            continue;
        }
        lines.push(format!(
            "{:<13}  {}{}",
            short_id(&folder.id.to_string()),
            "  ".repeat(depth),
            folder.name
        ));
        if let Some(nested) = children.get(&Some(folder.id)) {
            stack.extend(nested.iter().rev().map(|child| (*child, depth + 1)));
        }
    }
    lines
}
