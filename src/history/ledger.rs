//! Read-only view of the snapshot history

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{HistoryError, HistoryResult};
use crate::store::{self, RevisionStore, SnapshotId, StoreError, TreeId};

/// Shortest id prefix accepted as a reference
const MIN_PREFIX_LEN: usize = 4;

/// One point-in-time backup of the tracked files
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub timestamp: DateTime<Utc>,
    pub tag: Option<String>,
    pub message: String,
    pub parent: Option<SnapshotId>,
    pub is_head: bool,
    /// Created by gsb rather than by hand
    pub managed: bool,
    #[serde(skip)]
    pub tree: TreeId,
}

impl Snapshot {
    pub fn is_tagged(&self) -> bool {
        self.tag.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn short_id(&self) -> &str {
        store::short_id(&self.id)
    }

    /// The tag if there is one, otherwise the short id
    pub fn identifier(&self) -> &str {
        self.tag.as_deref().unwrap_or_else(|| self.short_id())
    }
}

/// Which snapshots [`SnapshotLedger::query`] returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// At most this many, counted after the other filters
    pub limit: Option<usize>,
    pub tags_only: bool,
    /// Only snapshots taken at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Also list commits made outside gsb, such as a manual `git commit`
    pub include_non_gsb: bool,
}

impl HistoryFilter {
    pub fn tagged() -> Self {
        Self {
            tags_only: true,
            ..Self::default()
        }
    }
}

/// The reachable history, newest first
#[derive(Debug, Clone, Default)]
pub struct SnapshotLedger {
    snapshots: Vec<Snapshot>,
}

impl SnapshotLedger {
    /// Read the history from the store, checking that it forms one chain
    pub fn load<S: RevisionStore + ?Sized>(store: &S) -> HistoryResult<Self> {
        let records = store.log()?;
        let mut seen = HashSet::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            if !seen.insert(record.id.as_str()) {
                return Err(broken_chain(format!("{} appears twice", record.id)));
            }
            let expected = records.get(i + 1).map(|next| &next.id);
            if record.parent.as_ref() != expected {
                return Err(broken_chain(format!(
                    "{} has parent {:?}, expected {:?}",
                    record.id, record.parent, expected
                )));
            }
        }

        let snapshots = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| Snapshot {
                id: record.id,
                timestamp: record.timestamp,
                tag: record.tag,
                message: record.message,
                parent: record.parent,
                is_head: i == 0,
                managed: record.managed,
                tree: record.tree,
            })
            .collect();

        Ok(Self { snapshots })
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn list(&self, limit: Option<usize>, tags_only: bool) -> Vec<&Snapshot> {
        self.query(&HistoryFilter {
            limit,
            tags_only,
            ..HistoryFilter::default()
        })
    }

    pub fn query(&self, filter: &HistoryFilter) -> Vec<&Snapshot> {
        self.snapshots
            .iter()
            .filter(|s| filter.include_non_gsb || s.managed)
            .filter(|s| !filter.tags_only || s.is_tagged())
            .filter(|s| filter.since.map_or(true, |since| s.timestamp >= since))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect()
    }

    pub fn current(&self) -> HistoryResult<&Snapshot> {
        self.snapshots.first().ok_or(HistoryError::NoHistory)
    }

    pub fn root(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn get(&self, id: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.id == id)
    }

    /// Distance from the head, 0 being the head itself
    pub fn position(&self, id: &str) -> Option<usize> {
        self.snapshots.iter().position(|s| s.id == id)
    }

    pub fn tag_owner(&self, tag: &str) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .find(|s| s.tag.as_deref() == Some(tag))
    }

    /// Every tagged snapshot plus the untagged ones newer than the latest
    /// tag, newest first. These are the ones worth offering in a picker.
    /// Commits made outside gsb are left out.
    pub fn recent_and_tagged(&self) -> Vec<&Snapshot> {
        let managed: Vec<&Snapshot> = self.snapshots.iter().filter(|s| s.managed).collect();
        let latest_tag = managed
            .iter()
            .position(|s| s.is_tagged())
            .unwrap_or(managed.len());
        managed
            .into_iter()
            .enumerate()
            .filter(|(i, s)| *i < latest_tag || s.is_tagged())
            .map(|(_, s)| s)
            .collect()
    }

    /// Resolve a reference to a snapshot.
    ///
    /// Accepted forms, tried in order: `HEAD` or `@`; `~N`, `HEAD~N` or
    /// `@~N` for N snapshots back; a tag name; a full id or a unique prefix
    /// of at least four hex digits.
    pub fn find(&self, reference: &str) -> HistoryResult<&Snapshot> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(HistoryError::invalid("No backup was specified"));
        }

        if reference == "HEAD" || reference == "@" {
            return self.current();
        }

        if let Some(offset) = parse_offset(reference) {
            self.current()?;
            return self
                .snapshots
                .get(offset)
                .ok_or_else(|| HistoryError::NotFound(reference.to_string()));
        }

        if let Some(snapshot) = self.tag_owner(reference) {
            return Ok(snapshot);
        }

        if let Some(snapshot) = self.get(reference) {
            return Ok(snapshot);
        }

        if reference.len() >= MIN_PREFIX_LEN && reference.chars().all(|c| c.is_ascii_hexdigit()) {
            let prefix = reference.to_ascii_lowercase();
            let mut matches = self.snapshots.iter().filter(|s| s.id.starts_with(&prefix));
            if let Some(first) = matches.next() {
                if matches.next().is_some() {
                    return Err(HistoryError::invalid(format!(
                        "{} matches more than one backup, use a longer prefix",
                        reference
                    )));
                }
                return Ok(first);
            }
        }

        Err(HistoryError::NotFound(reference.to_string()))
    }
}

fn broken_chain(detail: String) -> HistoryError {
    HistoryError::Store(StoreError::ParseError(format!(
        "history is not a single chain: {}",
        detail
    )))
}

fn parse_offset(reference: &str) -> Option<usize> {
    let rest = ["HEAD~", "@~", "~"]
        .iter()
        .find_map(|prefix| reference.strip_prefix(prefix))?;
    if rest.is_empty() {
        return Some(1);
    }
    rest.parse().ok()
}
