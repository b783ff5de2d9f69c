//! A gsb-managed save directory
//!
//! [`SaveRepo`] is what the CLI talks to. It serializes mutating operations
//! with the store's operation lock and makes sure nothing unsaved is lost
//! before history is rewound or pruned.

mod export;
mod onboard;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use export::{archive_format_for, default_archive_extension};
pub use onboard::{create_repo, tracked_patterns, update_gitignore, INITIAL_MESSAGE};

use crate::config::{Manifest, ManifestError};
use crate::error::{HistoryError, HistoryResult};
use crate::history::{
    self, CheckpointRequest, HistoryFilter, HistoryState, Outcome, PruneReport, RewindRequest,
    Snapshot, SnapshotLedger,
};
use crate::store::{GitStore, OperationLock, RevisionStore, StoreError};

/// Message of the backup taken before rewinding
pub const UNSAVED_BEFORE_REWIND: &str = "Backing up unsaved changes before rewinding";

/// Message of the backup taken before deleting
pub const UNSAVED_BEFORE_DELETE: &str = "Backing up unsaved changes before deleting backups";

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("{0} does not exist")]
    Missing(PathBuf),
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("{0} already contains a gsb-managed save")]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A save directory and the history store behind it
#[derive(Debug)]
pub struct SaveRepo<S = GitStore> {
    store: S,
}

impl SaveRepo<GitStore> {
    /// Open the gsb-managed save rooted at `root`
    pub fn open(root: &Path) -> Result<Self, RepoError> {
        let manifest = Manifest::read(root)?;
        let store = GitStore::open(root, manifest)?;
        tracing::debug!(root = %root.display(), "Opened save");
        Ok(Self { store })
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn name(&self) -> &str {
        &self.store.manifest().name
    }
}

impl<S: RevisionStore> SaveRepo<S> {
    pub fn with_store(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Back up the tracked files
    pub fn checkpoint(&self, request: &CheckpointRequest) -> HistoryResult<Outcome> {
        let _lock = self.lock()?;
        let state = HistoryState::load(&self.store)?;
        history::checkpoint(&self.store, &state, request)
    }

    /// Restore a backup, first saving anything not yet backed up
    ///
    /// The target is resolved against the history as it was before the
    /// safety backup, so `HEAD` and `~N` mean what the caller saw.
    pub fn rewind(&self, request: &RewindRequest) -> HistoryResult<Outcome> {
        let _lock = self.lock()?;
        let mut request = request.clone();
        request.target = self.ledger()?.find(&request.target)?.id.clone();

        let state = self.backup_unsaved(UNSAVED_BEFORE_REWIND)?;
        history::rewind(&self.store, &state, &request)
    }

    /// Delete backups, first saving anything not yet backed up
    ///
    /// References are resolved before the safety backup is taken.
    pub fn delete(&self, selection: &[String]) -> HistoryResult<PruneReport> {
        let _lock = self.lock()?;
        if selection.is_empty() {
            return Err(HistoryError::invalid("No backups were selected for deletion"));
        }
        let ledger = self.ledger()?;
        let ids = selection
            .iter()
            .map(|reference| ledger.find(reference).map(|s| s.id.clone()))
            .collect::<HistoryResult<Vec<_>>>()?;

        let state = self.backup_unsaved(UNSAVED_BEFORE_DELETE)?;
        history::delete(&self.store, &state, &ids)
    }

    pub fn list_history(&self, filter: &HistoryFilter) -> HistoryResult<Vec<Snapshot>> {
        let ledger = self.ledger()?;
        Ok(ledger.query(filter).into_iter().cloned().collect())
    }

    pub fn ledger(&self) -> HistoryResult<SnapshotLedger> {
        SnapshotLedger::load(&self.store)
    }

    fn lock(&self) -> HistoryResult<OperationLock> {
        self.store.lock().map_err(|e| match e {
            StoreError::Locked(reason) => HistoryError::Busy(reason),
            other => HistoryError::Store(other),
        })
    }

    fn backup_unsaved(&self, message: &str) -> HistoryResult<HistoryState> {
        let state = HistoryState::load(&self.store)?;
        if state.head.is_none() || self.store.is_clean()? {
            return Ok(state);
        }

        tracing::info!("{}", message);
        let outcome = history::checkpoint(
            &self.store,
            &state,
            &CheckpointRequest::with_message(message),
        )?;
        Ok(outcome.state)
    }
}
