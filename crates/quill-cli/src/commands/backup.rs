use std::path::Path;

use quill_core::sync::EntityKind;
use quill_core::{Backup, RestoreSummary};

use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_backup_export(output: &Path, data_dir: &Path) -> Result<Backup, CliError> {
    let store = open_store(data_dir).await?;
    let backup = store.export_backup().await?;
    backup.write_to(output).await?;

    println!(
        "Exported {} folder(s), {} note(s) and {} media file(s) to {}",
        backup.count(EntityKind::Folder),
        backup.count(EntityKind::Note),
        backup.count(EntityKind::Media),
        output.display()
    );
    Ok(backup)
}

pub async fn run_backup_import(input: &Path, data_dir: &Path) -> Result<RestoreSummary, CliError> {
    let backup = Backup::read_from(input).await?;
    let store = open_store(data_dir).await?;
    let summary = store.restore_backup(&backup).await?;

    println!(
        "Restored {} entit(ies), removed {}; sync checkpoints were reset",
        summary.restored, summary.removed
    );
    Ok(summary)
}
