//! Git-backed revision store
//!
//! History lives on the `gsb` branch of an ordinary git repository rooted at
//! the save directory, with `HEAD` pointing at it. Everything goes through the
//! `git` executable so the repository stays usable with stock git tooling.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use chrono::{TimeZone, Utc};

use super::{
    short_id, CommitRecord, OperationLock, RefUpdate, RevisionStore, RewriteOutcome,
    RewriteRequest, SnapshotId, StoreError, StoreResult, TreeId,
};
use crate::config::{Manifest, REQUIRED_FILES};

/// Branch holding the snapshot history
pub const BRANCH_NAME: &str = "gsb";
const BRANCH_REF: &str = "refs/heads/gsb";

/// Advisory lock file, created inside the git directory
pub const LOCK_FILE_NAME: &str = "gsb.lock";

/// Committer of every commit gsb writes, which is how gsb-made commits are
/// told apart from manual ones. The author is the user's own identity.
pub const COMMITTER_NAME: &str = "gsb";
pub const COMMITTER_EMAIL: &str = "gsb@localhost";

const FIELD_SEP: char = '\x1f';
const RECORD_SEP: char = '\x1e';

/// Archive formats `git archive` can write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveFormat {
    /// Value for `git archive --format`
    pub fn git_format(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::TarXz => "tar.xz",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.git_format()
    }

    /// Compressor git has no built-in entry for, registered per invocation
    /// through `tar.<format>.command`
    fn filter(&self) -> Option<&'static str> {
        match self {
            ArchiveFormat::TarBz2 => Some("bzip2 -c"),
            ArchiveFormat::TarXz => Some("xz -c"),
            ArchiveFormat::Zip | ArchiveFormat::Tar | ArchiveFormat::TarGz => None,
        }
    }
}

/// A tag ref as listed by `git for-each-ref`
#[derive(Debug, Clone)]
struct TagRef {
    name: String,
    /// The tag object for annotated tags, the commit for lightweight ones
    object: String,
    target: SnapshotId,
    annotated: bool,
}

/// Everything needed to recreate a commit on a new parent
#[derive(Debug, Clone)]
struct CommitMeta {
    author_name: String,
    author_email: String,
    author_date: String,
    committer_name: String,
    committer_email: String,
    committer_date: String,
    tree: TreeId,
    message: String,
}

/// Revision store backed by the git CLI
#[derive(Debug, Clone)]
pub struct GitStore {
    root: PathBuf,
    manifest: Manifest,
    /// The gsb committer, plus an author for repos with no `user.name` /
    /// `user.email`
    identity: Vec<(&'static str, String)>,
}

impl GitStore {
    /// Open the git repository at `root`, tracking what `manifest` selects
    pub fn open(root: &Path, manifest: Manifest) -> StoreResult<Self> {
        let mut store = Self {
            root: root.to_path_buf(),
            manifest,
            identity: Vec::new(),
        };

        if !store.is_git_repo() {
            return Err(StoreError::NotFound(format!(
                "{} is not a git repository",
                root.display()
            )));
        }

        store.identity = store.commit_identity()?;
        Ok(store)
    }

    /// Initialize (or re-initialize) a repository and point `HEAD` at the
    /// history branch. Existing branches and commits are left alone.
    pub fn init(root: &Path) -> StoreResult<()> {
        check(&["init"], git_at(root, &["init"])?)?;

        let has_commits = git_at(root, &["rev-parse", "--verify", "--quiet", "HEAD^{commit}"])?
            .status
            .success();
        if has_commits {
            let branch_exists = git_at(root, &["rev-parse", "--verify", "--quiet", BRANCH_REF])?
                .status
                .success();
            if !branch_exists {
                let args = ["branch", BRANCH_NAME, "HEAD"];
                check(&args, git_at(root, &args)?)?;
            }
        }

        let args = ["symbolic-ref", "HEAD", BRANCH_REF];
        check(&args, git_at(root, &args)?)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Write a snapshot's tree to an archive file
    pub fn archive(
        &self,
        id: &SnapshotId,
        destination: &Path,
        format: ArchiveFormat,
    ) -> StoreResult<()> {
        let format_arg = format!("--format={}", format.git_format());
        let destination = destination.to_string_lossy();
        let filter = format
            .filter()
            .map(|command| format!("tar.{}.command={}", format.git_format(), command));

        let mut args = Vec::new();
        if let Some(filter) = &filter {
            args.extend(["-c", filter.as_str()]);
        }
        args.extend(["archive", format_arg.as_str(), "-o", &*destination, id.as_str()]);
        self.git(&args)?;
        Ok(())
    }

    fn is_git_repo(&self) -> bool {
        self.command(&["rev-parse", "--git-dir"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn commit_identity(&self) -> StoreResult<Vec<(&'static str, String)>> {
        let mut identity = vec![
            ("GIT_COMMITTER_NAME", COMMITTER_NAME.to_string()),
            ("GIT_COMMITTER_EMAIL", COMMITTER_EMAIL.to_string()),
        ];
        if self.try_git(&["config", "user.name"])?.is_none() {
            identity.push(("GIT_AUTHOR_NAME", COMMITTER_NAME.to_string()));
        }
        if self.try_git(&["config", "user.email"])?.is_none() {
            identity.push(("GIT_AUTHOR_EMAIL", COMMITTER_EMAIL.to_string()));
        }
        Ok(identity)
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.root);
        for (key, value) in &self.identity {
            cmd.env(key, value);
        }
        cmd
    }

    fn git(&self, args: &[&str]) -> StoreResult<String> {
        check(args, self.command(args).output()?)
    }

    fn git_with_input(&self, args: &[&str], input: &str) -> StoreResult<String> {
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes())?;
        }

        check(args, child.wait_with_output()?)
    }

    /// Run a command whose quiet failure means "no such thing"
    fn try_git(&self, args: &[&str]) -> StoreResult<Option<String>> {
        let output = self.command(args).output()?;
        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()));
        }
        if output.stderr.is_empty() {
            return Ok(None);
        }
        Err(classify(&String::from_utf8_lossy(&output.stderr)))
    }

    fn pathspecs(&self) -> Vec<&str> {
        self.manifest
            .patterns
            .iter()
            .map(String::as_str)
            .chain(REQUIRED_FILES)
            .collect()
    }

    /// Stage every tracked file, including deletions
    fn stage(&self) -> StoreResult<()> {
        for pattern in &self.manifest.patterns {
            self.add(&["add", "--all", "--", pattern])?;
        }
        for required in REQUIRED_FILES {
            self.add(&["add", "--force", "--", required])?;
        }
        Ok(())
    }

    fn add(&self, args: &[&str]) -> StoreResult<()> {
        match self.git(args) {
            Ok(_) => Ok(()),
            Err(StoreError::CommandFailed(msg)) if msg.contains("did not match any files") => {
                tracing::debug!(
                    pathspec = args.last().copied().unwrap_or_default(),
                    "Pathspec matched no files"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn tags(&self) -> StoreResult<Vec<TagRef>> {
        let output = self.git(&[
            "for-each-ref",
            "--format=%(refname:strip=2)%1f%(objecttype)%1f%(objectname)%1f%(*objectname)",
            "refs/tags",
        ])?;

        output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let parts: Vec<&str> = line.split(FIELD_SEP).collect();
                if parts.len() != 4 {
                    return Err(StoreError::ParseError(format!("tag listing: {}", line)));
                }
                let annotated = parts[1] == "tag";
                Ok(TagRef {
                    name: parts[0].to_string(),
                    object: parts[2].to_string(),
                    target: if annotated { parts[3] } else { parts[2] }.to_string(),
                    annotated,
                })
            })
            .collect()
    }

    fn commit_meta(&self, id: &SnapshotId) -> StoreResult<CommitMeta> {
        let output = self.git(&[
            "log",
            "-1",
            "--date=raw",
            "--format=%an%x1f%ae%x1f%ad%x1f%cn%x1f%ce%x1f%cd%x1f%T%x1f%B",
            id,
        ])?;

        let fields: Vec<&str> = output.splitn(8, FIELD_SEP).collect();
        if fields.len() != 8 {
            return Err(StoreError::ParseError(format!("commit metadata for {}", id)));
        }

        Ok(CommitMeta {
            author_name: fields[0].to_string(),
            author_email: fields[1].to_string(),
            author_date: fields[2].to_string(),
            committer_name: fields[3].to_string(),
            committer_email: fields[4].to_string(),
            committer_date: fields[5].to_string(),
            tree: fields[6].to_string(),
            message: fields[7].trim_end().to_string(),
        })
    }

    /// Recreate a commit on top of `parent`, keeping identities and dates
    fn replay(&self, meta: &CommitMeta, parent: &SnapshotId) -> StoreResult<SnapshotId> {
        let args = [
            "commit-tree",
            "--no-gpg-sign",
            meta.tree.as_str(),
            "-p",
            parent.as_str(),
            "-m",
            meta.message.as_str(),
        ];
        let output = self
            .command(&args)
            .env("GIT_AUTHOR_NAME", &meta.author_name)
            .env("GIT_AUTHOR_EMAIL", &meta.author_email)
            .env("GIT_AUTHOR_DATE", &meta.author_date)
            .env("GIT_COMMITTER_NAME", &meta.committer_name)
            .env("GIT_COMMITTER_EMAIL", &meta.committer_email)
            .env("GIT_COMMITTER_DATE", &meta.committer_date)
            .output()?;
        Ok(check(&args, output)?.trim().to_string())
    }

    /// Write an annotated tag object without creating the ref
    fn make_tag(
        &self,
        name: &str,
        target: &SnapshotId,
        message: &str,
        tagger: Option<String>,
    ) -> StoreResult<String> {
        let tagger = match tagger {
            Some(tagger) => tagger,
            None => self.git(&["var", "GIT_COMMITTER_IDENT"])?.trim().to_string(),
        };
        let body = format!(
            "object {}\ntype commit\ntag {}\ntagger {}\n\n{}\n",
            target, name, tagger, message
        );
        Ok(self.git_with_input(&["mktag"], &body)?.trim().to_string())
    }

    /// Tagger line and annotation of an existing tag object
    fn tag_meta(&self, object: &str) -> StoreResult<(String, String)> {
        let raw = self.git(&["cat-file", "tag", object])?;
        let (header, message) = raw.split_once("\n\n").unwrap_or((raw.as_str(), ""));
        let tagger = header
            .lines()
            .find_map(|line| line.strip_prefix("tagger "))
            .ok_or_else(|| StoreError::ParseError(format!("tag {} has no tagger", object)))?;
        Ok((tagger.to_string(), message.trim_end().to_string()))
    }

    /// Move the history branch and tags in a single `update-ref` transaction.
    /// A `None` tag target deletes the tag.
    ///
    /// Every tag is checked against the value it had when the transaction
    /// was built, so a tag created or moved concurrently fails the whole
    /// update instead of being overwritten.
    fn transaction(
        &self,
        reason: &str,
        expected_head: Option<&str>,
        new_head: &str,
        tags: &BTreeMap<String, Option<String>>,
    ) -> StoreResult<()> {
        let mut script = match expected_head {
            Some(old) => format!("update {} {} {}\n", BRANCH_REF, new_head, old),
            None => format!("create {} {}\n", BRANCH_REF, new_head),
        };
        let current: HashMap<String, String> = self
            .tags()?
            .into_iter()
            .map(|tag| (tag.name, tag.object))
            .collect();
        for (name, object) in tags {
            let line = match (object, current.get(name)) {
                (Some(object), Some(old)) => format!("update refs/tags/{} {} {}\n", name, object, old),
                (Some(object), None) => format!("create refs/tags/{} {}\n", name, object),
                (None, Some(old)) => format!("delete refs/tags/{} {}\n", name, old),
                (None, None) => continue,
            };
            script.push_str(&line);
        }

        self.git_with_input(&["update-ref", "-m", reason, "--stdin"], &script)?;
        tracing::debug!(head = %short_id(new_head), tags = tags.len(), "Published ref transaction");
        Ok(())
    }
}

impl RevisionStore for GitStore {
    fn head(&self) -> StoreResult<Option<SnapshotId>> {
        self.try_git(&[
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("{}^{{commit}}", BRANCH_REF),
        ])
    }

    fn log(&self) -> StoreResult<Vec<CommitRecord>> {
        if self.head()?.is_none() {
            return Ok(Vec::new());
        }

        // for-each-ref sorts by refname, so the alphabetically first tag wins
        let mut tags_by_target: HashMap<String, String> = HashMap::new();
        for tag in self.tags()? {
            tags_by_target.entry(tag.target).or_insert(tag.name);
        }

        let output = self.git(&[
            "log",
            "--first-parent",
            "--format=%H%x1f%P%x1f%ct%x1f%T%x1f%cn%x1f%B%x1e",
            BRANCH_REF,
        ])?;
        parse_log(&output, &tags_by_target)
    }

    fn is_clean(&self) -> StoreResult<bool> {
        let mut args = vec!["status", "--porcelain", "--untracked-files=all", "--"];
        args.extend(self.pathspecs());
        Ok(self.git(&args)?.trim().is_empty())
    }

    fn write_tree(&self) -> StoreResult<TreeId> {
        self.stage()?;
        Ok(self.git(&["write-tree"])?.trim().to_string())
    }

    fn commit(
        &self,
        tree: &TreeId,
        message: &str,
        parent: Option<&SnapshotId>,
    ) -> StoreResult<SnapshotId> {
        let mut args = vec!["commit-tree", "--no-gpg-sign", tree.as_str()];
        if let Some(parent) = parent {
            args.extend(["-p", parent.as_str()]);
        }
        args.extend(["-m", message]);
        Ok(self.git(&args)?.trim().to_string())
    }

    fn amend(&self, id: &SnapshotId, tree: &TreeId, message: &str) -> StoreResult<SnapshotId> {
        // Validates the id before looking at its parent
        self.tree_of(id)?;
        let parent = self.try_git(&["rev-parse", "--verify", "--quiet", &format!("{}^1", id)])?;
        self.commit(tree, message, parent.as_ref())
    }

    fn update_refs(&self, update: &RefUpdate) -> StoreResult<()> {
        let mut tags: BTreeMap<String, Option<String>> = update
            .delete_tags
            .iter()
            .map(|name| (name.clone(), None))
            .collect();
        for tag in &update.create_tags {
            let object = self.make_tag(&tag.name, &tag.target, &tag.message, None)?;
            tags.insert(tag.name.clone(), Some(object));
        }

        self.transaction(
            "gsb: update history",
            update.expected_head.as_deref(),
            &update.new_head,
            &tags,
        )
    }

    fn rewrite_history(&self, request: &RewriteRequest) -> StoreResult<RewriteOutcome> {
        let current = self.head()?;
        if current.as_deref() != Some(request.expected_head.as_str()) {
            return Err(StoreError::StaleHead(format!(
                "expected {}, found {}",
                short_id(&request.expected_head),
                current.as_deref().map(short_id).unwrap_or("nothing")
            )));
        }

        let mut tags_by_target: HashMap<String, Vec<TagRef>> = HashMap::new();
        for tag in self.tags()? {
            tags_by_target.entry(tag.target.clone()).or_default().push(tag);
        }

        let mut tag_updates: BTreeMap<String, Option<String>> = request
            .dropped_tags
            .iter()
            .map(|name| (name.clone(), None))
            .collect();

        // Every tag on a commit leaving the chain goes too, not only the
        // ones the ledger reported
        let range = format!("{}..{}", request.base, request.expected_head);
        let replaced = self.git(&["rev-list", "--first-parent", &range])?;
        for id in replaced.lines().map(str::trim) {
            if request.retained.iter().any(|kept| kept == id) {
                continue;
            }
            for tag in tags_by_target.get(id).into_iter().flatten() {
                tag_updates.entry(tag.name.clone()).or_insert(None);
            }
        }

        let mut parent = request.base.clone();
        let mut remapped = Vec::with_capacity(request.retained.len());

        // Objects first; nothing is visible until the transaction below
        for id in &request.retained {
            let meta = self.commit_meta(id)?;
            let new_id = self.replay(&meta, &parent)?;

            for tag in tags_by_target.get(id).into_iter().flatten() {
                let object = if tag.annotated {
                    let (tagger, message) = self.tag_meta(&tag.object)?;
                    self.make_tag(&tag.name, &new_id, &message, Some(tagger))?
                } else {
                    new_id.clone()
                };
                tag_updates.insert(tag.name.clone(), Some(object));
            }

            tracing::debug!(old = %short_id(id), new = %short_id(&new_id), "Replayed snapshot");
            remapped.push((id.clone(), new_id.clone()));
            parent = new_id;
        }

        self.transaction(
            "gsb: rewrite history",
            Some(&request.expected_head),
            &parent,
            &tag_updates,
        )?;

        Ok(RewriteOutcome {
            head: parent,
            remapped,
        })
    }

    fn checkout_tree(&self, tree: &TreeId) -> StoreResult<()> {
        match self.git(&["read-tree", "-u", "--reset", tree]) {
            Ok(_) => Ok(()),
            Err(StoreError::CommandFailed(reason)) => Err(StoreError::Materialize {
                path: self.root.clone(),
                reason,
            }),
            Err(e) => Err(e),
        }
    }

    fn tree_of(&self, id: &SnapshotId) -> StoreResult<TreeId> {
        match self.git(&["rev-parse", "--verify", &format!("{}^{{tree}}", id)]) {
            Ok(tree) => Ok(tree.trim().to_string()),
            Err(StoreError::CommandFailed(_)) => Err(StoreError::NotFound(id.clone())),
            Err(e) => Err(e),
        }
    }

    fn contains(&self, id: &SnapshotId) -> StoreResult<bool> {
        let output = self
            .command(&["cat-file", "-e", &format!("{}^{{commit}}", id)])
            .output()?;
        Ok(output.status.success())
    }

    fn tag_target(&self, name: &str) -> StoreResult<Option<SnapshotId>> {
        Ok(self
            .tags()?
            .into_iter()
            .find(|tag| tag.name == name)
            .map(|tag| tag.target))
    }

    fn list_tags(&self) -> StoreResult<Vec<String>> {
        Ok(self.tags()?.into_iter().map(|tag| tag.name).collect())
    }

    fn lock(&self) -> StoreResult<OperationLock> {
        let git_dir = self.git(&["rev-parse", "--absolute-git-dir"])?;
        OperationLock::acquire_file(&PathBuf::from(git_dir.trim()).join(LOCK_FILE_NAME))
    }
}

fn git_at(root: &Path, args: &[&str]) -> StoreResult<Output> {
    Ok(Command::new("git").args(args).current_dir(root).output()?)
}

fn check(args: &[&str], output: Output) -> StoreResult<String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    tracing::debug!(command = ?args, %stderr, "git command failed");
    Err(classify(&stderr))
}

fn classify(stderr: &str) -> StoreError {
    let stderr = stderr.trim().to_string();
    if stderr.contains("but expected") || stderr.contains("reference already exists") {
        StoreError::StaleHead(stderr)
    } else if stderr.contains("cannot lock ref") || stderr.contains(".lock': File exists") {
        StoreError::Locked(stderr)
    } else {
        StoreError::CommandFailed(stderr)
    }
}

fn parse_log(output: &str, tags: &HashMap<String, String>) -> StoreResult<Vec<CommitRecord>> {
    output
        .split(RECORD_SEP)
        .map(|chunk| chunk.trim_start_matches('\n'))
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let fields: Vec<&str> = chunk.splitn(6, FIELD_SEP).collect();
            if fields.len() != 6 {
                return Err(StoreError::ParseError(format!("log entry: {:?}", chunk)));
            }

            let seconds: i64 = fields[2]
                .trim()
                .parse()
                .map_err(|_| StoreError::ParseError(format!("commit time {:?}", fields[2])))?;
            let timestamp = Utc
                .timestamp_opt(seconds, 0)
                .single()
                .ok_or_else(|| StoreError::ParseError(format!("commit time {}", seconds)))?;

            Ok(CommitRecord {
                id: fields[0].to_string(),
                parent: fields[1].split_whitespace().next().map(str::to_string),
                timestamp,
                tree: fields[3].to_string(),
                managed: fields[4] == COMMITTER_NAME,
                message: fields[5].trim_end().to_string(),
                tag: tags.get(fields[0]).cloned(),
            })
        })
        .collect()
}
