//! Backup engine: turn the current working tree into a snapshot

use super::{ensure_state, publish_error, HistoryState, Outcome, DEFAULT_MESSAGE};
use crate::error::{HistoryError, HistoryResult};
use crate::history::ledger::{Snapshot, SnapshotLedger};
use crate::store::{short_id, NewTag, RefUpdate, RevisionStore, SnapshotId};
use crate::util::validate_tag_name;

/// How a new backup relates to the ones before it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CombineMode {
    /// Append a new snapshot
    #[default]
    None,
    /// Replace the latest snapshot
    CombineLast,
    /// Replace every untagged snapshot since the last tagged one
    CombineSinceLastTag,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointRequest {
    pub message: Option<String>,
    pub tag: Option<String>,
    pub combine: CombineMode,
}

impl CheckpointRequest {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn tagged(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn combine(mut self, mode: CombineMode) -> Self {
        self.combine = mode;
        self
    }

    fn message(&self) -> &str {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MESSAGE)
    }
}

/// What a checkpoint will do to the chain
struct Plan<'a> {
    parent: Option<SnapshotId>,
    /// Set when the head is replaced in place
    amend: Option<&'a Snapshot>,
    replaced: Vec<&'a Snapshot>,
}

/// Record the current state of the tracked files.
///
/// The new snapshot becomes the head. In the combine modes the snapshots it
/// replaces drop out of the chain (their objects remain in the store) and
/// their tags are removed.
pub fn checkpoint<S: RevisionStore + ?Sized>(
    store: &S,
    state: &HistoryState,
    request: &CheckpointRequest,
) -> HistoryResult<Outcome> {
    validate(request)?;

    let rewriting = request.combine != CombineMode::None;
    ensure_state(store, state).map_err(|e| publish_error(e, rewriting))?;

    let ledger = SnapshotLedger::load(store)?;
    let plan = plan(&ledger, request)?;

    if let Some(tag) = &request.tag {
        // Tags anywhere in the store count, not only those on the chain
        if let Some(target) = store.tag_target(tag)? {
            if !plan.replaced.iter().any(|s| s.id == target) {
                return Err(HistoryError::invalid(format!(
                    "A tag named {} already exists ({})",
                    tag,
                    short_id(&target)
                )));
            }
        }
    }

    let message = request.message();
    let tree = store.write_tree()?;
    let id = match plan.amend {
        Some(head) => store.amend(&head.id, &tree, message)?,
        None => store.commit(&tree, message, plan.parent.as_ref())?,
    };

    let stale_tags = plan
        .replaced
        .iter()
        .filter_map(|s| s.tag.clone())
        .filter(|t| request.tag.as_ref() != Some(t));
    let update = RefUpdate::advance(state.head.clone(), id.clone())
        .deleting_tags(stale_tags)
        .with_tag(request.tag.as_ref().map(|name| NewTag {
            name: name.clone(),
            target: id.clone(),
            message: message.to_string(),
        }));
    store
        .update_refs(&update)
        .map_err(|e| publish_error(e, rewriting))?;

    let ledger = SnapshotLedger::load(store)?;
    let snapshot = ledger.current()?.clone();

    tracing::info!(
        id = %snapshot.short_id(),
        tag = ?snapshot.tag,
        replaced = plan.replaced.len(),
        "Created backup"
    );

    Ok(Outcome {
        snapshot,
        state: HistoryState { head: Some(id) },
    })
}

fn validate(request: &CheckpointRequest) -> HistoryResult<()> {
    if let Some(tag) = &request.tag {
        let described = request
            .message
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty());
        if !described {
            return Err(HistoryError::invalid(
                "Tagged backups need a description",
            ));
        }
        validate_tag_name(tag).map_err(HistoryError::InvalidRequest)?;
    }

    if request.combine == CombineMode::CombineSinceLastTag && request.tag.is_none() {
        return Err(HistoryError::invalid(
            "Combining with everything since the last tag needs a tag",
        ));
    }

    Ok(())
}

fn plan<'a>(ledger: &'a SnapshotLedger, request: &CheckpointRequest) -> HistoryResult<Plan<'a>> {
    let Ok(head) = ledger.current() else {
        // Every mode starts the history the same way
        return Ok(Plan {
            parent: None,
            amend: None,
            replaced: Vec::new(),
        });
    };

    match request.combine {
        CombineMode::None => Ok(Plan {
            parent: Some(head.id.clone()),
            amend: None,
            replaced: Vec::new(),
        }),
        CombineMode::CombineLast => {
            if head.is_tagged() && request.tag.is_none() {
                return Err(HistoryError::invalid(format!(
                    "The latest backup is tagged {}; give a tag to combine with it",
                    head.identifier()
                )));
            }
            Ok(Plan {
                parent: head.parent.clone(),
                amend: Some(head),
                replaced: vec![head],
            })
        }
        CombineMode::CombineSinceLastTag => {
            let mut replaced = Vec::new();
            let mut boundary = None;
            for snapshot in ledger.snapshots() {
                let carries_requested = snapshot.tag.is_some() && snapshot.tag == request.tag;
                if snapshot.is_root() || (snapshot.is_tagged() && !carries_requested) {
                    boundary = Some(snapshot.id.clone());
                    break;
                }
                replaced.push(snapshot);
            }
            Ok(Plan {
                parent: boundary,
                amend: None,
                replaced,
            })
        }
    }
}
