//! Quill CLI - notes with folder, removable-drive and network sync

mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{
    BackupCommands, Cli, Commands, FolderCommands, MediaCommands, ProfileCommands, SyncCommands,
};
use crate::commands::add::{run_add, run_quick_capture};
use crate::commands::backup::{run_backup_export, run_backup_import};
use crate::commands::common::{resolve_data_dir, resolve_profiles_path};
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, run_move};
use crate::commands::folder::{
    run_folder_add, run_folder_delete, run_folder_list, run_folder_move, run_folder_rename,
};
use crate::commands::list::{run_list, run_search, run_show};
use crate::commands::media::{
    run_media_delete, run_media_export, run_media_import, run_media_list,
};
use crate::commands::profile::{run_profile_add, run_profile_list, run_profile_remove};
use crate::commands::sync::{
    run_sync, run_sync_conflicts, run_sync_prune, run_sync_reset, run_sync_status,
};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    for directive in ["quill=info", "quill_core=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir);
    let profiles_path = resolve_profiles_path(cli.profiles);

    match cli.command {
        Some(Commands::Add {
            title,
            content,
            folder,
        }) => {
            run_add(&title, &content, folder.as_deref(), &data_dir).await?;
        }
        Some(Commands::List {
            limit,
            tag,
            folder,
            json,
        }) => {
            run_list(limit, tag.as_deref(), folder.as_deref(), json, &data_dir).await?;
        }
        Some(Commands::Search { query, limit, json }) => {
            run_search(&query, limit, json, &data_dir).await?;
        }
        Some(Commands::Show { id }) => run_show(&id, &data_dir).await?,
        Some(Commands::Edit { id, title, content }) => {
            run_edit(&id, title.as_deref(), content.as_deref(), &data_dir).await?;
        }
        Some(Commands::Move { id, folder }) => {
            run_move(&id, folder.as_deref(), &data_dir).await?;
        }
        Some(Commands::Delete { id }) => {
            run_delete(&id, &data_dir).await?;
        }
        Some(Commands::Folder { command }) => match command {
            FolderCommands::Add { name, parent } => {
                run_folder_add(&name, parent.as_deref(), &data_dir).await?;
            }
            FolderCommands::List { json } => run_folder_list(json, &data_dir).await?,
            FolderCommands::Rename { id, name } => {
                run_folder_rename(&id, &name, &data_dir).await?;
            }
            FolderCommands::Move { id, parent } => {
                run_folder_move(&id, parent.as_deref(), &data_dir).await?;
            }
            FolderCommands::Delete { id } => {
                run_folder_delete(&id, &data_dir).await?;
            }
        },
        Some(Commands::Media { command }) => match command {
            MediaCommands::Import { path } => {
                run_media_import(&path, &data_dir).await?;
            }
            MediaCommands::List { json } => run_media_list(json, &data_dir).await?,
            MediaCommands::Export { id, output } => {
                run_media_export(&id, &output, &data_dir).await?;
            }
            MediaCommands::Delete { id } => {
                run_media_delete(&id, &data_dir).await?;
            }
        },
        Some(Commands::Profile { command }) => match command {
            ProfileCommands::Add {
                name,
                protocol,
                settings,
            } => {
                run_profile_add(&name, protocol, &settings, &profiles_path)?;
            }
            ProfileCommands::List { json } => run_profile_list(json, &profiles_path)?,
            ProfileCommands::Remove { name } => {
                run_profile_remove(&name, &profiles_path, &data_dir).await?;
            }
        },
        Some(Commands::Sync { command }) => match command {
            SyncCommands::Run {
                profile,
                timeout,
                policy,
            } => {
                run_sync(&profile, timeout, policy.into(), &profiles_path, &data_dir).await?;
            }
            SyncCommands::Status { json } => {
                run_sync_status(json, &profiles_path, &data_dir).await?;
            }
            SyncCommands::Conflicts { limit, json } => {
                run_sync_conflicts(limit, json, &data_dir).await?;
            }
            SyncCommands::Reset { profile } => {
                run_sync_reset(&profile, &profiles_path, &data_dir).await?;
            }
            SyncCommands::Prune { days } => {
                run_sync_prune(days, &data_dir).await?;
            }
        },
        Some(Commands::Backup { command }) => match command {
            BackupCommands::Export { output } => {
                run_backup_export(&output, &data_dir).await?;
            }
            BackupCommands::Import { input } => {
                run_backup_import(&input, &data_dir).await?;
            }
        },
        None => {
            // Quick capture mode: quill "my thought"
            if cli.note.is_empty() {
                Cli::command().print_help()?;
                println!();
            } else {
                run_quick_capture(&cli.note, &data_dir).await?;
            }
        }
    }

    Ok(())
}
