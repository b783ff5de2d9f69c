//! Prune engine: drop snapshots from the history
//!
//! Nothing is destroyed. The snapshots that stay are replayed onto the
//! nearest surviving ancestor of the oldest deleted one. The deleted
//! snapshots simply stop being reachable and are left for `git gc`.

use std::collections::BTreeSet;

use super::{ensure_state, HistoryState};
use crate::error::{HistoryError, HistoryResult};
use crate::history::ledger::{Snapshot, SnapshotLedger};
use crate::store::{short_id, RevisionStore, RewriteRequest};

#[derive(Debug, Clone)]
pub struct PruneReport {
    /// The deleted snapshots, newest first, as they were before the rewrite
    pub removed: Vec<Snapshot>,
    pub state: HistoryState,
}

/// Delete the snapshots named by `selection`.
///
/// The head may be deleted, in which case the nearest surviving snapshot
/// becomes the head. The working tree is never touched. The first snapshot
/// cannot be deleted.
pub fn delete<S: RevisionStore + ?Sized>(
    store: &S,
    state: &HistoryState,
    selection: &[String],
) -> HistoryResult<PruneReport> {
    if selection.is_empty() {
        return Err(HistoryError::invalid("No backups were selected for deletion"));
    }

    ensure_state(store, state).map_err(|e| HistoryError::RewriteConflict(e.to_string()))?;

    let ledger = SnapshotLedger::load(store)?;
    let head = ledger.current()?.id.clone();

    // Positions count back from the head, so the largest is the oldest
    let mut selected = BTreeSet::new();
    for reference in selection {
        let snapshot = ledger.find(reference)?;
        if snapshot.is_root() {
            return Err(HistoryError::invalid(format!(
                "{} is the first backup, which cannot be deleted",
                snapshot.identifier()
            )));
        }
        if let Some(position) = ledger.position(&snapshot.id) {
            selected.insert(position);
        }
    }

    let Some(&oldest) = selected.iter().next_back() else {
        return Err(HistoryError::invalid("No backups were selected for deletion"));
    };
    let snapshots = ledger.snapshots();
    let Some(base) = snapshots[oldest].parent.clone() else {
        return Err(HistoryError::invalid("The first backup cannot be deleted"));
    };

    let retained = (0..oldest)
        .rev()
        .filter(|i| !selected.contains(i))
        .map(|i| snapshots[i].id.clone())
        .collect();
    let removed: Vec<Snapshot> = selected.iter().map(|&i| snapshots[i].clone()).collect();
    let dropped_tags = removed.iter().filter_map(|s| s.tag.clone()).collect();

    let request = RewriteRequest {
        expected_head: head,
        base,
        retained,
        dropped_tags,
    };
    let outcome = store
        .rewrite_history(&request)
        .map_err(|e| HistoryError::RewriteConflict(e.to_string()))?;

    tracing::info!(
        removed = removed.len(),
        replayed = outcome.remapped.len(),
        head = %short_id(&outcome.head),
        "Deleted backups"
    );

    Ok(PruneReport {
        removed,
        state: HistoryState {
            head: Some(outcome.head),
        },
    })
}
