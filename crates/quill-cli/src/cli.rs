use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use quill_core::sync::{ConflictPolicy, ProtocolKind};

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill - notes that sync over folders, removable drives and the network")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Data directory (defaults to QUILL_DATA_DIR or the platform data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Sync profiles file (defaults to QUILL_PROFILES or the platform config dir)
    #[arg(long, global = true)]
    pub profiles: Option<PathBuf>,

    /// Quick capture: quill "My thought here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new note
    Add {
        /// Note title
        title: String,
        /// Note content (read from stdin when omitted and piped)
        #[arg(trailing_var_arg = true)]
        content: Vec<String>,
        /// Folder id or unique prefix
        #[arg(short, long)]
        folder: Option<String>,
    },
    /// List notes
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Filter by tag
        #[arg(short, long, conflicts_with = "folder")]
        tag: Option<String>,
        /// Only notes in this folder (id or unique prefix)
        #[arg(short, long)]
        folder: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find notes whose title or content contains the query
    Search {
        query: String,
        /// Maximum number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a note
    Show {
        /// Note ID or unique prefix
        id: String,
    },
    /// Change a note's title or content
    Edit {
        /// Note ID or unique prefix
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Move a note into a folder, or to the top level
    Move {
        /// Note ID or unique prefix
        id: String,
        /// Target folder; omit to move to the top level
        #[arg(short, long)]
        folder: Option<String>,
    },
    /// Delete a note
    Delete {
        /// Note ID or unique prefix
        id: String,
    },
    /// Manage folders
    Folder {
        #[command(subcommand)]
        command: FolderCommands,
    },
    /// Manage media files
    Media {
        #[command(subcommand)]
        command: MediaCommands,
    },
    /// Manage sync profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Run and inspect sync sessions
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Export or restore the whole store
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
}

#[derive(Subcommand)]
pub enum FolderCommands {
    /// Create a folder
    Add {
        name: String,
        /// Parent folder id or unique prefix
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// List folders
    List {
        #[arg(long)]
        json: bool,
    },
    /// Rename a folder
    Rename { id: String, name: String },
    /// Move a folder under another folder, or to the top level
    Move {
        id: String,
        /// New parent folder; omit to move to the top level
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Delete an empty folder
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum MediaCommands {
    /// Copy a file into the media store
    Import { path: PathBuf },
    /// List media
    List {
        #[arg(long)]
        json: bool,
    },
    /// Write a media file's content to a path
    Export { id: String, output: PathBuf },
    /// Delete a media file
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Add a sync profile
    Add {
        name: String,
        /// removable_media, network or local_folder
        #[arg(long, value_parser = parse_protocol)]
        protocol: ProtocolKind,
        /// Profile setting, e.g. path=/mnt/share/quill or server_url=http://host:8080
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_setting)]
        settings: Vec<(String, String)>,
    },
    /// List sync profiles
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a sync profile and its checkpoint
    Remove { name: String },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Synchronize with a profile
    Run {
        /// Profile name
        profile: String,
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// How delete-versus-modify conflicts are decided
        #[arg(long, value_enum, default_value_t = PolicyArg::NewestWins)]
        policy: PolicyArg,
    },
    /// Show the last successful sync per profile
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List recently resolved sync conflicts
    Conflicts {
        /// Maximum number of conflicts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget a profile's checkpoint so the next session compares everything
    Reset { profile: String },
    /// Drop deletion markers older than the retention window
    Prune {
        /// Retention in days
        #[arg(long, default_value = "30")]
        days: u32,
    },
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Write every folder, note and media file to a backup file
    Export { output: PathBuf },
    /// Replace the store's content with a backup file
    Import { input: PathBuf },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PolicyArg {
    NewestWins,
    DeletionWins,
}

impl From<PolicyArg> for ConflictPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::NewestWins => Self::NewestWins,
            PolicyArg::DeletionWins => Self::DeletionWins,
        }
    }
}

pub fn parse_protocol(value: &str) -> Result<ProtocolKind, String> {
    value.parse().map_err(|error: quill_core::sync::SyncError| error.to_string())
}

pub fn parse_setting(value: &str) -> Result<(String, String), String> {
    let (key, setting) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{value}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("setting key cannot be empty in '{value}'"));
    }
    Ok((key.to_string(), setting.trim().to_string()))
}
