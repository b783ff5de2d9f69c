//! Save directory test fixtures
//!
//! Provides temporary save directories backed by real git repositories.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use gsb::{create_repo, CheckpointRequest, SaveRepo, Snapshot};
use tempfile::TempDir;

/// A temporary save directory
///
/// The directory is removed when the `TestSave` is dropped.
pub struct TestSave {
    _dir: TempDir,
    /// Path to the save root
    pub path: PathBuf,
}

impl TestSave {
    /// A directory holding a couple of save files, not yet tracked
    ///
    /// Git is initialized with a local identity so the tests do not depend
    /// on the machine's global configuration.
    pub fn untracked() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("Test Save");
        fs::create_dir(&path).unwrap();

        git_in(&path, &["init", "--quiet"]);
        git_in(&path, &["config", "user.email", "test@example.com"]);
        git_in(&path, &["config", "user.name", "Test User"]);

        let save = Self { _dir: dir, path };
        save.write("slot1.sav", "level 1");
        save.write("settings.ini", "volume=5");
        save
    }

    /// A save tracked by gsb, holding only the initial snapshot
    pub fn new() -> Self {
        let save = Self::untracked();
        create_repo(&save.path, None, &[], &[]).expect("Failed to initialize save");
        save
    }

    /// A tracked save with one backup per entry, tagged where a tag is given
    pub fn with_history(entries: &[(&str, Option<&str>)]) -> (Self, Vec<Snapshot>) {
        let save = Self::new();
        let snapshots = entries
            .iter()
            .map(|(message, tag)| {
                save.write("slot1.sav", &format!("state: {}", message));
                match tag {
                    Some(tag) => save.tag(tag, message),
                    None => save.backup(message),
                }
            })
            .collect();
        (save, snapshots)
    }

    pub fn repo(&self) -> SaveRepo {
        SaveRepo::open(&self.path).expect("Failed to open save")
    }

    pub fn backup(&self, message: &str) -> Snapshot {
        self.repo()
            .checkpoint(&CheckpointRequest::with_message(message))
            .expect("Backup failed")
            .snapshot
    }

    pub fn tag(&self, tag: &str, message: &str) -> Snapshot {
        self.repo()
            .checkpoint(&CheckpointRequest::tagged(tag, message))
            .expect("Tagged backup failed")
            .snapshot
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path.join(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path.join(relative).exists()
    }

    /// Messages along the history branch, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.git(&["log", "--first-parent", "--reverse", "--format=%s", "gsb"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Run git in the save and return its trimmed stdout
    pub fn git(&self, args: &[&str]) -> String {
        git_in(&self.path, args)
    }

    /// Whether git still holds an object, reachable or not
    pub fn has_object(&self, id: &str) -> bool {
        Command::new("git")
            .args(["cat-file", "-e", id])
            .current_dir(&self.path)
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Run git in `dir`, panicking on failure
pub fn git_in(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
