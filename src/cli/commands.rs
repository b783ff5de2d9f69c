//! Implementations of the `gsb` subcommands

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, TimeZone, Utc};

use super::{describe, prompt, BackupArgs, DeleteArgs, ExportArgs, HistoryArgs, InitArgs, RewindArgs};
use crate::history::{CheckpointRequest, CombineMode, HistoryFilter, RewindRequest, SnapshotLedger};
use crate::repo::{create_repo, SaveRepo};
use crate::store::RevisionStore;
use crate::util::generate_tag_name;

pub fn init(args: &InitArgs) -> Result<()> {
    let root = args.save.root();
    let repo = create_repo(&root, args.name.as_deref(), &args.track, &args.ignore)
        .with_context(|| format!("Failed to start tracking {}", root.display()))?;
    tracing::info!(name = %repo.name(), "Save is now tracked by gsb");
    Ok(())
}

pub fn backup(args: &BackupArgs) -> Result<()> {
    let repo = open(&args.save.root())?;

    let combine = match args.combine {
        0 => CombineMode::None,
        1 => CombineMode::CombineLast,
        _ => CombineMode::CombineSinceLastTag,
    };
    let tag = tag_name(&repo, args.tag.as_deref(), args.tag_name.as_deref())?;

    let request = CheckpointRequest {
        message: args.tag.clone(),
        tag,
        combine,
    };
    repo.checkpoint(&request)?;
    Ok(())
}

pub fn history(args: &HistoryArgs) -> Result<()> {
    let repo = open(&args.save.root())?;

    let since = match args.since {
        Some(date) => {
            let midnight = date.and_hms_opt(0, 0, 0).context("Invalid --since date")?;
            let local = Local
                .from_local_datetime(&midnight)
                .earliest()
                .with_context(|| format!("{} has no midnight in the local time zone", date))?;
            Some(local.with_timezone(&Utc))
        }
        None => None,
    };
    let filter = HistoryFilter {
        limit: args.limit,
        tags_only: !args.all,
        since,
        include_non_gsb: args.include_non_gsb,
    };
    let snapshots = repo.list_history(&filter)?;

    let mut out = io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &snapshots)?;
        writeln!(out)?;
    } else if snapshots.is_empty() {
        tracing::info!("No backups to show");
    } else {
        for snapshot in &snapshots {
            writeln!(out, "{}", describe(snapshot))?;
        }
    }
    Ok(())
}

pub fn rewind(args: &RewindArgs) -> Result<()> {
    let repo = open(&save_root(args.path.as_deref()))?;

    let Some(target) = choose_one(&repo.ledger()?, args.revision.as_ref())? else {
        return Ok(());
    };
    let tag = tag_name(&repo, args.tag.as_deref(), None)?;

    let request = RewindRequest {
        target,
        tag,
        message: args.tag.clone(),
    };
    repo.rewind(&request)?;
    Ok(())
}

pub fn delete(args: &DeleteArgs) -> Result<()> {
    let repo = open(&save_root(args.path.as_deref()))?;

    let selection = if args.revisions.is_empty() {
        match prompt::select(&repo.ledger()?, true)? {
            Some(selection) => selection,
            None => return Ok(()),
        }
    } else {
        args.revisions.clone()
    };

    let report = repo.delete(&selection)?;
    for snapshot in &report.removed {
        tracing::info!(backup = %snapshot.identifier(), "Deleted backup");
    }
    tracing::info!(
        "Deleted backups stay on disk until you run `git gc --aggressive --prune=now` in {}",
        repo.root().display()
    );
    Ok(())
}

pub fn export(args: &ExportArgs) -> Result<()> {
    let repo = open(&save_root(args.path.as_deref()))?;

    let Some(reference) = choose_one(&repo.ledger()?, args.revision.as_ref())? else {
        return Ok(());
    };

    let path = repo.export(&reference, args.output.as_deref())?;
    println!("{}", path.display());
    Ok(())
}

fn open(root: &Path) -> Result<SaveRepo> {
    SaveRepo::open(root).with_context(|| format!("Could not open save at {}", root.display()))
}

fn save_root(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Use the revision given on the command line, or ask for one
fn choose_one(ledger: &SnapshotLedger, given: Option<&String>) -> Result<Option<String>> {
    match given {
        Some(revision) => Ok(Some(revision.clone())),
        None => Ok(prompt::select(ledger, false)?.and_then(|mut chosen| chosen.pop())),
    }
}

/// The tag to apply: the explicit name, a generated one when only a
/// description was given, or none at all
fn tag_name<S: RevisionStore>(
    repo: &SaveRepo<S>,
    description: Option<&str>,
    name: Option<&str>,
) -> Result<Option<String>> {
    match (description, name) {
        (_, Some(name)) => Ok(Some(name.to_string())),
        (Some(_), None) => {
            let existing = repo.store().list_tags()?;
            Ok(Some(generate_tag_name(Local::now(), &existing)))
        }
        (None, None) => Ok(None),
    }
}
