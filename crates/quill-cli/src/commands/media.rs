use std::path::Path;

use quill_core::{MediaId, MediaItem};

use crate::commands::common::{format_timestamp, open_store, resolve_media, short_id};
use crate::error::CliError;

pub async fn run_media_import(path: &Path, data_dir: &Path) -> Result<MediaId, CliError> {
    let store = open_store(data_dir).await?;
    let media = store.import_media(path).await?;

    println!("{}", media.id);
    Ok(media.id)
}

pub async fn run_media_list(as_json: bool, data_dir: &Path) -> Result<(), CliError> {
    let store = open_store(data_dir).await?;
    let media = store.list_media().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&media)?);
    } else {
        for line in format_media_lines(&media) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_media_export(id: &str, output: &Path, data_dir: &Path) -> Result<(), CliError> {
    let store = open_store(data_dir).await?;
    let media = resolve_media(id, &store).await?;
    store.export_media(&media.id, output).await?;

    println!("Exported {} to {}", media.file_name, output.display());
    Ok(())
}

pub async fn run_media_delete(id: &str, data_dir: &Path) -> Result<MediaId, CliError> {
    let store = open_store(data_dir).await?;
    let media = resolve_media(id, &store).await?;
    store.delete_media(&media.id).await?;

    println!("{}", media.id);
    Ok(media.id)
}

pub fn format_media_lines(media: &[MediaItem]) -> Vec<String> {
    media
        .iter()
        .map(|item| {
            format!(
                "{:<13}  {:<32}  {:<24}  {:>10}  {}",
                short_id(&item.id.to_string()),
                item.file_name,
                item.mime_type,
                format_size(item.size_bytes),
                format_timestamp(item.updated_at)
            )
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: i64) -> String {
    const KIB: i64 = 1024;
    const MIB: i64 = 1024 * KIB;

    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    }
}
