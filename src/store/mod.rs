//! Revision store adapter
//!
//! The history engines never talk to git directly. Everything they need from
//! the substrate goes through [`RevisionStore`]: capturing the working tree,
//! creating commits, publishing head and tag moves in one atomic step, and
//! replaying a chain onto a new base when snapshots are dropped.

mod git;
mod lock;
mod memory;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use git::{ArchiveFormat, GitStore, BRANCH_NAME, COMMITTER_EMAIL, COMMITTER_NAME, LOCK_FILE_NAME};
pub use lock::OperationLock;
pub use memory::{Files, MemoryStore};

/// Unique identifier for a snapshot (a git commit SHA for [`GitStore`])
pub type SnapshotId = String;

/// Identifier of a captured tree
pub type TreeId = String;

/// Leading characters of an id, as shown to users
pub fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Git command failed: {0}")]
    CommandFailed(String),
    #[error("Revision store is locked: {0}")]
    Locked(String),
    #[error("History head moved underneath this operation: {0}")]
    StaleHead(String),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Failed to parse git output: {0}")]
    ParseError(String),
    #[error("Failed to materialize {path}: {reason}")]
    Materialize { path: PathBuf, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Whether the error means the substrate refused to move refs right now
    /// (lock held elsewhere, or the head is not where the caller expected).
    pub fn is_contention(&self) -> bool {
        matches!(self, StoreError::Locked(_) | StoreError::StaleHead(_))
    }
}

/// One commit on the history branch, as reported by [`RevisionStore::log`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub id: SnapshotId,
    pub tree: TreeId,
    pub timestamp: DateTime<Utc>,
    pub tag: Option<String>,
    pub message: String,
    pub parent: Option<SnapshotId>,
    /// Whether gsb created this commit (as opposed to a manual `git commit`)
    pub managed: bool,
}

/// An annotated tag to create as part of a [`RefUpdate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTag {
    pub name: String,
    pub target: SnapshotId,
    pub message: String,
}

/// A set of ref moves applied all-or-nothing.
///
/// `expected_head` is compared against the current head before anything is
/// written; `None` means the history must still be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub expected_head: Option<SnapshotId>,
    pub new_head: SnapshotId,
    pub create_tags: Vec<NewTag>,
    pub delete_tags: Vec<String>,
}

impl RefUpdate {
    pub fn advance(expected_head: Option<SnapshotId>, new_head: SnapshotId) -> Self {
        Self {
            expected_head,
            new_head,
            create_tags: Vec::new(),
            delete_tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: Option<NewTag>) -> Self {
        self.create_tags.extend(tag);
        self
    }

    pub fn deleting_tags<I: IntoIterator<Item = String>>(mut self, tags: I) -> Self {
        self.delete_tags.extend(tags);
        self
    }
}

/// A history rewrite: every snapshot in `retained` (oldest first) is replayed
/// onto `base` with its tree, message, timestamps and tag intact. Snapshots
/// between `base` and the old head that are not listed are dropped from the
/// chain, and `dropped_tags` are removed with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRequest {
    pub expected_head: SnapshotId,
    pub base: SnapshotId,
    pub retained: Vec<SnapshotId>,
    pub dropped_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    /// The head of the rewritten chain
    pub head: SnapshotId,
    /// `(old id, new id)` for every replayed snapshot
    pub remapped: Vec<(SnapshotId, SnapshotId)>,
}

/// Capabilities the history engines need from the underlying revision store.
///
/// Object creation (`write_tree`, `commit`, `amend`) never moves refs. Only
/// [`update_refs`](RevisionStore::update_refs) and
/// [`rewrite_history`](RevisionStore::rewrite_history) change what the
/// history looks like, and both either fully apply or leave it untouched.
pub trait RevisionStore {
    /// The current head of history, if any snapshot exists
    fn head(&self) -> StoreResult<Option<SnapshotId>>;

    /// The reachable chain, newest first
    fn log(&self) -> StoreResult<Vec<CommitRecord>>;

    /// Whether the tracked files match the head snapshot exactly
    fn is_clean(&self) -> StoreResult<bool>;

    /// Capture the tracked working tree as a tree object
    fn write_tree(&self) -> StoreResult<TreeId>;

    /// Create a commit object. Does not move the head.
    fn commit(
        &self,
        tree: &TreeId,
        message: &str,
        parent: Option<&SnapshotId>,
    ) -> StoreResult<SnapshotId>;

    /// Create a replacement for `id` sharing its parent. Does not move the head.
    fn amend(&self, id: &SnapshotId, tree: &TreeId, message: &str) -> StoreResult<SnapshotId>;

    /// Atomically move the head and tags
    fn update_refs(&self, update: &RefUpdate) -> StoreResult<()>;

    /// Replay the retained chain onto the base and publish it atomically
    fn rewrite_history(&self, request: &RewriteRequest) -> StoreResult<RewriteOutcome>;

    /// Materialize a tree into the working directory
    fn checkout_tree(&self, tree: &TreeId) -> StoreResult<()>;

    /// Materialize a snapshot into the working directory
    fn checkout(&self, id: &SnapshotId) -> StoreResult<()> {
        let tree = self.tree_of(id)?;
        self.checkout_tree(&tree)
    }

    /// The tree captured by a snapshot
    fn tree_of(&self, id: &SnapshotId) -> StoreResult<TreeId>;

    /// Whether the store still holds the snapshot's objects, reachable or not
    fn contains(&self, id: &SnapshotId) -> StoreResult<bool>;

    /// The commit a tag points at, whether or not it is on the history chain
    fn tag_target(&self, name: &str) -> StoreResult<Option<SnapshotId>>;

    /// Every tag in the store, including ones gsb did not create
    fn list_tags(&self) -> StoreResult<Vec<String>>;

    /// Take the single-writer lock for this tracked tree
    fn lock(&self) -> StoreResult<OperationLock>;
}
