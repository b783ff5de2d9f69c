//! Snapshot history management
//!
//! Three engines mutate the history of a save, all on top of a
//! [`RevisionStore`]:
//!
//! - [`backup`] appends a snapshot, amends the head, or squashes the untagged
//!   run since the last tag into one tagged snapshot
//! - [`rewind`] restores an older snapshot by appending a copy of it
//! - [`prune`] drops snapshots by replaying the rest onto a new base
//!
//! Every engine takes the [`HistoryState`] the caller read and refuses to act
//! if the store has moved on since. The history stays linear.

pub mod backup;
pub mod ledger;
pub mod prune;
pub mod rewind;

pub use backup::{checkpoint, CheckpointRequest, CombineMode};
pub use ledger::{HistoryFilter, Snapshot, SnapshotLedger};
pub use prune::{delete, PruneReport};
pub use rewind::{rewind, RewindRequest};

use crate::error::{HistoryError, HistoryResult};
use crate::store::{short_id, RevisionStore, SnapshotId, StoreError};

/// Message for snapshots created without one
pub const DEFAULT_MESSAGE: &str = "GSB-managed commit";

/// Where the history currently ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryState {
    pub head: Option<SnapshotId>,
}

impl HistoryState {
    pub fn load<S: RevisionStore + ?Sized>(store: &S) -> HistoryResult<Self> {
        Ok(Self {
            head: store.head()?,
        })
    }
}

/// Result of an operation that creates a snapshot
#[derive(Debug, Clone)]
pub struct Outcome {
    pub snapshot: Snapshot,
    pub state: HistoryState,
}

/// Fail with [`StoreError::StaleHead`] if the store no longer matches `state`
fn ensure_state<S: RevisionStore + ?Sized>(store: &S, state: &HistoryState) -> Result<(), StoreError> {
    let head = store.head()?;
    if head != state.head {
        return Err(StoreError::StaleHead(format!(
            "history was read at {}, but is now at {}",
            describe(state.head.as_deref()),
            describe(head.as_deref())
        )));
    }
    Ok(())
}

fn describe(head: Option<&str>) -> &str {
    head.map(short_id).unwrap_or("the empty history")
}

/// Map a failure to publish a ref move. Contention becomes `Busy` for plain
/// appends and `RewriteConflict` for anything that replaces snapshots.
fn publish_error(err: StoreError, rewriting: bool) -> HistoryError {
    if !err.is_contention() {
        return HistoryError::Store(err);
    }
    if rewriting {
        HistoryError::RewriteConflict(err.to_string())
    } else {
        HistoryError::Busy(err.to_string())
    }
}
