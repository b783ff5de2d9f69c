//! In-process revision store
//!
//! Keeps commits and trees in hash-map arenas and simulates a working
//! directory as a path → bytes map. Used to drive the history engines in
//! tests without a git binary, including failure injection (busy refs,
//! unwritable files).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::{
    CommitRecord, OperationLock, RefUpdate, RevisionStore, RewriteOutcome, RewriteRequest,
    SnapshotId, StoreError, StoreResult, TreeId,
};

/// Working directory contents: relative path → file bytes
pub type Files = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
struct MemCommit {
    tree: TreeId,
    parent: Option<SnapshotId>,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MemTag {
    target: SnapshotId,
    message: String,
}

#[derive(Debug)]
struct State {
    commits: HashMap<SnapshotId, MemCommit>,
    trees: HashMap<TreeId, Files>,
    head: Option<SnapshotId>,
    tags: BTreeMap<String, MemTag>,
    working: Files,
    locked_paths: BTreeSet<String>,
    busy: bool,
    clock: DateTime<Utc>,
    counter: u64,
}

impl State {
    fn new_commit(
        &mut self,
        tree: &TreeId,
        message: &str,
        parent: Option<&SnapshotId>,
        timestamp: Option<DateTime<Utc>>,
    ) -> StoreResult<SnapshotId> {
        if !self.trees.contains_key(tree) {
            return Err(StoreError::NotFound(tree.clone()));
        }
        if let Some(parent) = parent {
            if !self.commits.contains_key(parent) {
                return Err(StoreError::NotFound(parent.clone()));
            }
        }

        self.counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.counter.to_be_bytes());
        hasher.update(tree.as_bytes());
        hasher.update(parent.map(String::as_str).unwrap_or_default().as_bytes());
        hasher.update(message.as_bytes());
        let id = format!("{:x}", hasher.finalize());

        let timestamp = match timestamp {
            Some(timestamp) => timestamp,
            None => {
                let now = self.clock;
                self.clock += Duration::minutes(1);
                now
            }
        };

        self.commits.insert(
            id.clone(),
            MemCommit {
                tree: tree.clone(),
                parent: parent.cloned(),
                message: message.to_string(),
                timestamp,
            },
        );
        Ok(id)
    }

    fn check_head(&self, expected: Option<&SnapshotId>) -> StoreResult<()> {
        if self.busy {
            return Err(StoreError::Locked("refs are locked".to_string()));
        }
        if self.head.as_ref() != expected {
            return Err(StoreError::StaleHead(format!(
                "expected {:?}, found {:?}",
                expected, self.head
            )));
        }
        Ok(())
    }

    /// Ids from the head back to the root
    fn chain(&self) -> Vec<SnapshotId> {
        let mut chain = Vec::new();
        let mut cursor = self.head.clone();
        while let Some(id) = cursor {
            cursor = self.commits.get(&id).and_then(|c| c.parent.clone());
            chain.push(id);
        }
        chain
    }
}

/// Arena-backed [`RevisionStore`] with a simulated working directory
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    op_flag: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_files(Files::new())
    }

    /// Start with the given working directory contents and no history
    pub fn with_files(files: Files) -> Self {
        let clock = Utc
            .with_ymd_and_hms(2023, 7, 10, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            state: Mutex::new(State {
                commits: HashMap::new(),
                trees: HashMap::new(),
                head: None,
                tags: BTreeMap::new(),
                working: files,
                locked_paths: BTreeSet::new(),
                busy: false,
                clock,
                counter: 0,
            }),
            op_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn write_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .working
            .insert(path.to_string(), contents.into());
    }

    pub fn remove_file(&self, path: &str) {
        self.state.lock().working.remove(path);
    }

    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().working.get(path).cloned()
    }

    /// A copy of the whole working directory
    pub fn files(&self) -> Files {
        self.state.lock().working.clone()
    }

    /// Contents captured by a tree
    pub fn tree_files(&self, tree: &TreeId) -> Option<Files> {
        self.state.lock().trees.get(tree).cloned()
    }

    /// Contents captured by a snapshot
    pub fn snapshot_files(&self, id: &SnapshotId) -> Option<Files> {
        let state = self.state.lock();
        let commit = state.commits.get(id)?;
        state.trees.get(&commit.tree).cloned()
    }

    /// Make a working file unwritable, as if a running game held it open
    pub fn lock_path(&self, path: &str) {
        self.state.lock().locked_paths.insert(path.to_string());
    }

    pub fn unlock_path(&self, path: &str) {
        self.state.lock().locked_paths.remove(path);
    }

    /// While busy, every ref move fails with [`StoreError::Locked`]
    pub fn set_busy(&self, busy: bool) {
        self.state.lock().busy = busy;
    }

    /// Number of commit objects ever created, reachable or not
    pub fn object_count(&self) -> usize {
        self.state.lock().commits.len()
    }

    /// Every tag name, including tags on unreachable snapshots
    pub fn tag_names(&self) -> Vec<String> {
        self.state.lock().tags.keys().cloned().collect()
    }

    /// Annotation of a tag
    pub fn tag_message(&self, name: &str) -> Option<String> {
        self.state.lock().tags.get(name).map(|tag| tag.message.clone())
    }

    /// Tag any commit, on the chain or not, as a user would by hand
    pub fn add_tag(&self, name: &str, target: &SnapshotId, message: &str) {
        self.state.lock().tags.insert(
            name.to_string(),
            MemTag {
                target: target.clone(),
                message: message.to_string(),
            },
        );
    }
}

impl RevisionStore for MemoryStore {
    fn head(&self) -> StoreResult<Option<SnapshotId>> {
        Ok(self.state.lock().head.clone())
    }

    fn log(&self) -> StoreResult<Vec<CommitRecord>> {
        let state = self.state.lock();

        let mut tags_by_target: HashMap<&str, &str> = HashMap::new();
        for (name, tag) in &state.tags {
            tags_by_target.entry(tag.target.as_str()).or_insert(name.as_str());
        }

        state
            .chain()
            .into_iter()
            .map(|id| {
                let commit = state
                    .commits
                    .get(&id)
                    .ok_or_else(|| StoreError::NotFound(id.clone()))?;
                Ok(CommitRecord {
                    tag: tags_by_target.get(id.as_str()).map(|t| t.to_string()),
                    id,
                    tree: commit.tree.clone(),
                    timestamp: commit.timestamp,
                    message: commit.message.clone(),
                    parent: commit.parent.clone(),
                    managed: true,
                })
            })
            .collect()
    }

    fn is_clean(&self) -> StoreResult<bool> {
        let state = self.state.lock();
        let committed = state
            .head
            .as_ref()
            .and_then(|head| state.commits.get(head))
            .and_then(|commit| state.trees.get(&commit.tree));
        Ok(match committed {
            Some(files) => *files == state.working,
            None => state.working.is_empty(),
        })
    }

    fn write_tree(&self) -> StoreResult<TreeId> {
        let mut state = self.state.lock();

        let mut hasher = Sha256::new();
        for (path, contents) in &state.working {
            hasher.update((path.len() as u64).to_be_bytes());
            hasher.update(path.as_bytes());
            hasher.update((contents.len() as u64).to_be_bytes());
            hasher.update(contents);
        }
        let tree = format!("{:x}", hasher.finalize());

        let files = state.working.clone();
        state.trees.entry(tree.clone()).or_insert(files);
        Ok(tree)
    }

    fn commit(
        &self,
        tree: &TreeId,
        message: &str,
        parent: Option<&SnapshotId>,
    ) -> StoreResult<SnapshotId> {
        self.state.lock().new_commit(tree, message, parent, None)
    }

    fn amend(&self, id: &SnapshotId, tree: &TreeId, message: &str) -> StoreResult<SnapshotId> {
        let mut state = self.state.lock();
        let parent = state
            .commits
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?
            .parent
            .clone();
        state.new_commit(tree, message, parent.as_ref(), None)
    }

    fn update_refs(&self, update: &RefUpdate) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.check_head(update.expected_head.as_ref())?;

        if !state.commits.contains_key(&update.new_head) {
            return Err(StoreError::NotFound(update.new_head.clone()));
        }
        if let Some(tag) = update
            .create_tags
            .iter()
            .find(|tag| !state.commits.contains_key(&tag.target))
        {
            return Err(StoreError::NotFound(tag.target.clone()));
        }

        for name in &update.delete_tags {
            state.tags.remove(name);
        }
        for tag in &update.create_tags {
            state.tags.insert(
                tag.name.clone(),
                MemTag {
                    target: tag.target.clone(),
                    message: tag.message.clone(),
                },
            );
        }
        state.head = Some(update.new_head.clone());
        Ok(())
    }

    fn rewrite_history(&self, request: &RewriteRequest) -> StoreResult<RewriteOutcome> {
        let mut state = self.state.lock();
        state.check_head(Some(&request.expected_head))?;

        let chain = state.chain();
        let base_position = chain
            .iter()
            .position(|id| *id == request.base)
            .ok_or_else(|| StoreError::NotFound(request.base.clone()))?;
        let replaced = &chain[..base_position];
        if let Some(missing) = request.retained.iter().find(|id| !replaced.contains(*id)) {
            return Err(StoreError::NotFound(missing.clone()));
        }

        // Build the new chain off to the side, then swap it in
        let mut tags = state.tags.clone();
        for name in &request.dropped_tags {
            tags.remove(name);
        }
        tags.retain(|_, tag| {
            !replaced.contains(&tag.target) || request.retained.contains(&tag.target)
        });

        let mut parent = request.base.clone();
        let mut remapped = Vec::with_capacity(request.retained.len());
        for id in &request.retained {
            let original = state
                .commits
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            let new_id = state.new_commit(
                &original.tree,
                &original.message,
                Some(&parent),
                Some(original.timestamp),
            )?;
            for tag in tags.values_mut().filter(|tag| tag.target == *id) {
                tag.target = new_id.clone();
            }
            remapped.push((id.clone(), new_id.clone()));
            parent = new_id;
        }

        state.tags = tags;
        state.head = Some(parent.clone());
        Ok(RewriteOutcome {
            head: parent,
            remapped,
        })
    }

    fn checkout_tree(&self, tree: &TreeId) -> StoreResult<()> {
        let mut state = self.state.lock();
        let target = state
            .trees
            .get(tree)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(tree.clone()))?;

        let paths: BTreeSet<String> = state
            .working
            .keys()
            .chain(target.keys())
            .cloned()
            .collect();

        // Files are written one at a time, so a locked file leaves the
        // directory half-updated, like a real filesystem would
        for path in paths {
            let wanted = target.get(&path);
            if state.working.get(&path) == wanted {
                continue;
            }
            if state.locked_paths.contains(&path) {
                return Err(StoreError::Materialize {
                    path: path.into(),
                    reason: "file is locked".to_string(),
                });
            }
            match wanted {
                Some(contents) => {
                    state.working.insert(path, contents.clone());
                }
                None => {
                    state.working.remove(&path);
                }
            }
        }
        Ok(())
    }

    fn tree_of(&self, id: &SnapshotId) -> StoreResult<TreeId> {
        self.state
            .lock()
            .commits
            .get(id)
            .map(|commit| commit.tree.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn contains(&self, id: &SnapshotId) -> StoreResult<bool> {
        Ok(self.state.lock().commits.contains_key(id))
    }

    fn tag_target(&self, name: &str) -> StoreResult<Option<SnapshotId>> {
        Ok(self.state.lock().tags.get(name).map(|tag| tag.target.clone()))
    }

    fn list_tags(&self) -> StoreResult<Vec<String>> {
        Ok(self.tag_names())
    }

    fn lock(&self) -> StoreResult<OperationLock> {
        OperationLock::acquire_flag(self.op_flag.clone())
    }
}
