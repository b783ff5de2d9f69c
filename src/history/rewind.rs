//! Rewind engine: restore an older snapshot without branching

use super::{ensure_state, HistoryState, Outcome};
use crate::error::{HistoryError, HistoryResult};
use crate::history::ledger::SnapshotLedger;
use crate::store::{short_id, NewTag, RefUpdate, RevisionStore, StoreError, TreeId};
use crate::util::validate_tag_name;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewindRequest {
    /// Any reference [`SnapshotLedger::find`] accepts
    pub target: String,
    pub tag: Option<String>,
    pub message: Option<String>,
}

impl RewindRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Tag the restored snapshot, using `message` as its description
    pub fn tagged(mut self, tag: impl Into<String>, message: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self.message = Some(message.into());
        self
    }
}

/// Restore the tracked files to `request.target` and record that as a new
/// snapshot on top of the current head.
///
/// If the files cannot be written, whatever was already written is put back
/// and the call fails with [`HistoryError::RestoreFailed`].
pub fn rewind<S: RevisionStore + ?Sized>(
    store: &S,
    state: &HistoryState,
    request: &RewindRequest,
) -> HistoryResult<Outcome> {
    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());

    if let Some(tag) = &request.tag {
        if message.is_none() {
            return Err(HistoryError::invalid("Tagged backups need a description"));
        }
        validate_tag_name(tag).map_err(HistoryError::InvalidRequest)?;
    }

    ensure_state(store, state).map_err(|e| HistoryError::Busy(e.to_string()))?;

    let ledger = SnapshotLedger::load(store)?;
    let target = ledger.find(&request.target)?.clone();
    let head = ledger.current()?.clone();

    if let Some(tag) = &request.tag {
        if let Some(target) = store.tag_target(tag)? {
            return Err(HistoryError::invalid(format!(
                "A tag named {} already exists ({})",
                tag,
                short_id(&target)
            )));
        }
    }

    let message = match message {
        Some(message) => message.to_string(),
        None => format!("Restored from {}: {}", target.identifier(), target.message),
    };

    let rollback = store.write_tree()?;

    if let Err(e) = store.checkout_tree(&target.tree) {
        tracing::warn!(snapshot = %target.identifier(), error = %e, "Restore failed, rolling back");
        return Err(HistoryError::RestoreFailed(with_rollback(store, &rollback, e)));
    }

    let published = store
        .commit(&target.tree, &message, Some(&head.id))
        .and_then(|id| {
            let update = RefUpdate::advance(Some(head.id.clone()), id.clone()).with_tag(
                request.tag.as_ref().map(|name| NewTag {
                    name: name.clone(),
                    target: id.clone(),
                    message: message.clone(),
                }),
            );
            store.update_refs(&update).map(|()| id)
        });

    let id = match published {
        Ok(id) => id,
        Err(e) => {
            let contention = e.is_contention();
            let detail = with_rollback(store, &rollback, e);
            return Err(if contention {
                HistoryError::Busy(detail)
            } else {
                HistoryError::Store(StoreError::CommandFailed(detail))
            });
        }
    };

    let snapshot = SnapshotLedger::load(store)?.current()?.clone();
    tracing::info!(
        id = %snapshot.short_id(),
        restored = %target.identifier(),
        "Rewound to backup"
    );

    Ok(Outcome {
        snapshot,
        state: HistoryState { head: Some(id) },
    })
}

/// Put the captured tree back, folding any second failure into the message
fn with_rollback<S: RevisionStore + ?Sized>(store: &S, rollback: &TreeId, cause: StoreError) -> String {
    match store.checkout_tree(rollback) {
        Ok(()) => cause.to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to roll back the working tree");
            format!("{} (rolling back also failed: {})", cause, e)
        }
    }
}
