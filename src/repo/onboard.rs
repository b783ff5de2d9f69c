//! Start tracking a save directory

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use super::{RepoError, SaveRepo};
use crate::config::{default_name, Manifest, MANIFEST_NAME, REQUIRED_FILES};
use crate::history::CheckpointRequest;
use crate::store::GitStore;

/// Message of the first snapshot of every save
pub const INITIAL_MESSAGE: &str = "Start of gsb tracking";

const GITIGNORE: &str = ".gitignore";
const GITIGNORE_MARKER: &str = "# gsb";

/// Set up gsb in an existing directory and take the first backup.
///
/// With no `patterns` the whole directory is tracked. `ignore` patterns go
/// into `.gitignore`.
pub fn create_repo(
    root: &Path,
    name: Option<&str>,
    patterns: &[String],
    ignore: &[String],
) -> Result<SaveRepo<GitStore>, RepoError> {
    if !root.exists() {
        return Err(RepoError::Missing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(RepoError::NotADirectory(root.to_path_buf()));
    }
    if root.join(MANIFEST_NAME).exists() {
        return Err(RepoError::AlreadyExists(root.to_path_buf()));
    }

    let patterns = tracked_patterns(patterns);
    tracing::info!(root = %root.display(), patterns = ?patterns, "Initializing save");

    GitStore::init(root)?;
    update_gitignore(root, ignore)?;

    let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => default_name(root),
    };
    Manifest::new(root, &name, patterns).write()?;

    // Read back what was written, so a bad manifest fails here and not later
    let manifest = Manifest::read(root)?;
    let repo = SaveRepo::with_store(GitStore::open(root, manifest)?);
    repo.checkpoint(&CheckpointRequest::with_message(INITIAL_MESSAGE))?;

    Ok(repo)
}

/// The patterns to record in the manifest
pub fn tracked_patterns(patterns: &[String]) -> Vec<String> {
    let mut tracked: BTreeSet<String> = patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    if tracked.is_empty() {
        return vec![".".to_string()];
    }
    if !tracked.contains(".") {
        tracked.extend(REQUIRED_FILES.iter().map(|f| f.to_string()));
    }
    tracked.into_iter().collect()
}

/// Add `ignore` to the save's `.gitignore`, creating it if needed.
///
/// Existing content is kept. Patterns already listed are skipped, and the
/// first gsb addition to a non-empty file goes under a `# gsb` header.
pub fn update_gitignore(root: &Path, ignore: &[String]) -> Result<(), RepoError> {
    let path = root.join(GITIGNORE);
    let existing = if path.exists() {
        fs::read_to_string(&path)?
    } else {
        String::new()
    };

    let present: HashSet<&str> = existing.lines().map(str::trim).collect();
    let additions: BTreeSet<&str> = ignore
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && !present.contains(p))
        .collect();

    let mut contents = existing.clone();
    if !additions.is_empty() {
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        if !existing.trim().is_empty() && !present.contains(GITIGNORE_MARKER) {
            contents.push('\n');
            contents.push_str(GITIGNORE_MARKER);
            contents.push('\n');
        }
        for pattern in &additions {
            contents.push_str(pattern);
            contents.push('\n');
        }
    }

    if !path.exists() || contents != existing {
        fs::write(&path, contents)?;
        tracing::debug!(added = additions.len(), "Updated .gitignore");
    }
    Ok(())
}
