//! Command-line interface

mod commands;
mod prompt;

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::history::Snapshot;

pub use prompt::{parse_selection, select_from};

/// Environment variable holding a log filter, e.g. `GSB_LOG=gsb=debug`
pub const LOG_ENV: &str = "GSB_LOG";

/// Incremental backups of your game save states, using git
#[derive(Parser, Debug)]
#[command(name = "gsb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Show more log output (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Show less log output (-q, -qq)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Log level implied by `-v` and `-q`, starting from INFO
    pub fn log_level(&self) -> tracing::Level {
        match 2 + i16::from(self.verbose) - i16::from(self.quiet) {
            i16::MIN..=0 => tracing::Level::ERROR,
            1 => tracing::Level::WARN,
            2 => tracing::Level::INFO,
            3 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start tracking a save directory
    Init(InitArgs),
    /// Back up the current state of a save
    Backup(BackupArgs),
    /// List the backups of a save
    History(HistoryArgs),
    /// Restore a backup (the current state is backed up first)
    Rewind(RewindArgs),
    /// Delete backups from the history
    Delete(DeleteArgs),
    /// Write a backup to a standalone archive
    Export(ExportArgs),
}

/// Which save to work on
#[derive(Args, Debug, Clone, Default)]
pub struct SaveArgs {
    /// The save directory (defaults to the current directory)
    #[arg(value_name = "SAVE_PATH")]
    pub save_path: Option<PathBuf>,

    /// The save directory, as an option
    #[arg(long = "path", value_name = "PATH", conflicts_with = "save_path")]
    pub path: Option<PathBuf>,
}

impl SaveArgs {
    pub fn root(&self) -> PathBuf {
        self.path
            .clone()
            .or_else(|| self.save_path.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub save: SaveArgs,

    /// Track only files matching this pattern (repeatable)
    #[arg(long = "track", value_name = "PATTERN")]
    pub track: Vec<String>,

    /// Never track files matching this pattern (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// Display name for the save (defaults to the directory name)
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    #[command(flatten)]
    pub save: SaveArgs,

    /// Tag this backup with a description
    #[arg(long, value_name = "DESCRIPTION")]
    pub tag: Option<String>,

    /// Name for the tag (generated from the time if not given)
    #[arg(long, value_name = "NAME")]
    pub tag_name: Option<String>,

    /// Replace the latest backup; twice (-cc) replaces everything since the
    /// last tagged backup
    #[arg(short = 'c', long = "combine", action = ArgAction::Count)]
    pub combine: u8,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[command(flatten)]
    pub save: SaveArgs,

    /// Show at most this many backups
    #[arg(short = 'n', long = "limit", value_name = "N")]
    pub limit: Option<usize>,

    /// Only show backups made on or after this date
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub since: Option<NaiveDate>,

    /// Include untagged backups
    #[arg(short = 'a', long = "all")]
    pub all: bool,

    /// Include commits and tags made outside gsb
    #[arg(long)]
    pub include_non_gsb: bool,

    /// Print the backups as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RewindArgs {
    /// The backup to restore (prompted for if not given)
    #[arg(value_name = "REVISION")]
    pub revision: Option<String>,

    /// The save directory (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Tag the restored state with a description
    #[arg(long, value_name = "DESCRIPTION")]
    pub tag: Option<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// The backups to delete (prompted for if not given)
    #[arg(value_name = "REVISION")]
    pub revisions: Vec<String>,

    /// The save directory (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    pub path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// The backup to export (prompted for if not given)
    #[arg(value_name = "REVISION")]
    pub revision: Option<String>,

    /// The save directory (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Where to write the archive; the extension picks the format
    #[arg(short = 'o', long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,
}

/// Run a parsed command line
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init(args) => commands::init(&args),
        Command::Backup(args) => commands::backup(&args),
        Command::History(args) => commands::history(&args),
        Command::Rewind(args) => commands::rewind(&args),
        Command::Delete(args) => commands::delete(&args),
        Command::Export(args) => commands::export(&args),
    }
}

/// One line describing a snapshot, as shown in listings and prompts
pub fn describe(snapshot: &Snapshot) -> String {
    let when = snapshot
        .timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S");
    let summary = snapshot.message.lines().next().unwrap_or_default();
    let marker = if snapshot.is_head { " (current)" } else { "" };
    format!("- {}: {} ({}){}", snapshot.identifier(), summary, when, marker)
}
