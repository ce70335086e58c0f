//! forge::mock
//!
//! In-memory object graph implementing [`GitDataForge`] for deterministic
//! testing.
//!
//! # Design
//!
//! The mock stores blobs, trees, commits and branch refs in memory and
//! applies the same rules the hosted API does: overlay semantics for
//! `create_tree`, existence checks on referenced objects, and fast-forward
//! enforcement in `update_ref`. Every call is recorded so tests can assert
//! call order, and any operation can be configured to fail.
//!
//! Object ids are sequential hex strings, not content hashes.
//!
//! # Example
//!
//! ```
//! use treepush::core::types::RepoCoordinates;
//! use treepush::forge::mock::MockForge;
//! use treepush::forge::GitDataForge;
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new();
//! let tip = forge.seed_branch("main", &[("README.md", "hi")]);
//!
//! let coords = RepoCoordinates::parse("octocat", "hello", "main").unwrap();
//! assert_eq!(forge.fetch_latest_commit(&coords).await.unwrap(), tip);
//! # });
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::traits::{
    validate_commit_message, validate_tree_items, ForgeError, GitDataForge, RemoteTreeEntry,
};
use crate::core::types::{ObjectId, RepoCoordinates};
use crate::stage::{ObjectKind, ObjectMode, TreeItem};

/// Mock forge for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockForge {
    inner: Arc<Mutex<MockForgeInner>>,
}

#[derive(Debug, Default)]
struct MockForgeInner {
    next_id: u64,
    blobs: HashMap<ObjectId, Vec<u8>>,
    trees: HashMap<ObjectId, BTreeMap<String, MockEntry>>,
    commits: HashMap<ObjectId, MockCommit>,
    /// Branch name to tip commit.
    refs: HashMap<String, ObjectId>,
    fail_on: Option<FailOn>,
    /// Branch to advance just before the next `update_ref` is processed.
    concurrent_push: Option<String>,
    operations: Vec<MockOperation>,
}

#[derive(Debug, Clone)]
struct MockEntry {
    mode: ObjectMode,
    kind: ObjectKind,
    sha: ObjectId,
}

/// A commit stored in the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCommit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub message: String,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    FetchLatestCommit(ForgeError),
    FetchBaseTree(ForgeError),
    CreateTree(ForgeError),
    CreateCommit(ForgeError),
    UpdateRef(ForgeError),
    CreateBlob(ForgeError),
    FetchTree(ForgeError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    FetchLatestCommit {
        branch: String,
    },
    FetchBaseTree {
        commit: ObjectId,
    },
    CreateTree {
        base_tree: Option<ObjectId>,
        paths: Vec<String>,
    },
    CreateCommit {
        tree: ObjectId,
        parent: ObjectId,
        message: String,
    },
    UpdateRef {
        branch: String,
        commit: ObjectId,
        force: bool,
    },
    CreateBlob {
        size: usize,
    },
    FetchTree {
        tree: ObjectId,
    },
}

impl MockOperation {
    /// Short name of the operation, for order assertions.
    pub fn name(&self) -> &'static str {
        match self {
            MockOperation::FetchLatestCommit { .. } => "fetch_latest_commit",
            MockOperation::FetchBaseTree { .. } => "fetch_base_tree",
            MockOperation::CreateTree { .. } => "create_tree",
            MockOperation::CreateCommit { .. } => "create_commit",
            MockOperation::UpdateRef { .. } => "update_ref",
            MockOperation::CreateBlob { .. } => "create_blob",
            MockOperation::FetchTree { .. } => "fetch_tree",
        }
    }
}

impl MockForge {
    /// Create an empty mock with no branches.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockForgeInner> {
        // A panicking test thread must not hide the state from the others.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create `branch` pointing at a root commit containing `files`.
    ///
    /// File paths may contain `/`; intermediate trees are created.
    pub fn seed_branch(&self, branch: &str, files: &[(&str, &str)]) -> ObjectId {
        let mut inner = self.lock();
        let items: Vec<TreeItem> = files
            .iter()
            .map(|(path, content)| TreeItem::with_content(*path, ObjectMode::Normal, *content))
            .collect();
        let tree = inner
            .build_tree(None, &items)
            .unwrap_or_else(|e| panic!("invalid seed files: {e}"));
        let commit = inner.store_commit(tree, vec![], "initial commit".into());
        inner.refs.insert(branch.to_string(), commit.clone());
        commit
    }

    /// Simulate another writer pushing a commit on top of `branch`.
    ///
    /// Returns the new tip.
    pub fn advance_branch(&self, branch: &str, message: &str) -> ObjectId {
        self.lock().advance(branch, message)
    }

    /// Make another writer push to `branch` right before the next
    /// `update_ref` call is processed.
    pub fn push_concurrently_before_update(&self, branch: &str) {
        self.lock().concurrent_push = Some(branch.to_string());
    }

    /// Configure the mock to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Names of recorded operations, in call order.
    pub fn operation_names(&self) -> Vec<&'static str> {
        self.lock().operations.iter().map(MockOperation::name).collect()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Current tip of `branch`.
    pub fn branch_tip(&self, branch: &str) -> Option<ObjectId> {
        self.lock().refs.get(branch).cloned()
    }

    /// A stored commit.
    pub fn commit(&self, sha: &ObjectId) -> Option<MockCommit> {
        self.lock().commits.get(sha).cloned()
    }

    /// Read the text of the blob at `path` in `commit`'s tree.
    pub fn read_file(&self, commit: &ObjectId, path: &str) -> Option<String> {
        let inner = self.lock();
        let entry = inner.lookup(commit, path)?;
        let bytes = inner.blobs.get(&entry.sha)?;
        String::from_utf8(bytes.clone()).ok()
    }

    /// Mode of the entry at `path` in `commit`'s tree.
    pub fn file_mode(&self, commit: &ObjectId, path: &str) -> Option<ObjectMode> {
        self.lock().lookup(commit, path).map(|e| e.mode)
    }

    /// Every blob path in `commit`'s tree, sorted.
    pub fn list_files(&self, commit: &ObjectId) -> Vec<String> {
        let inner = self.lock();
        let mut out = Vec::new();
        if let Some(c) = inner.commits.get(commit) {
            inner.collect_paths(&c.tree, "", &mut out);
        }
        out.sort();
        out
    }

    /// Number of trees stored, including orphans from failed commits.
    pub fn tree_count(&self) -> usize {
        self.lock().trees.len()
    }
}

impl MockForgeInner {
    fn next_object_id(&mut self) -> ObjectId {
        self.next_id += 1;
        // Always 40 hex chars, so construction cannot fail.
        ObjectId::new(format!("{:040x}", self.next_id)).unwrap_or_else(|e| panic!("{e}"))
    }

    fn take_failure(&self, matches: impl Fn(&FailOn) -> Option<&ForgeError>) -> Result<(), ForgeError> {
        match self.fail_on.as_ref().and_then(matches) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn store_blob(&mut self, bytes: Vec<u8>) -> ObjectId {
        let id = self.next_object_id();
        self.blobs.insert(id.clone(), bytes);
        id
    }

    fn store_commit(&mut self, tree: ObjectId, parents: Vec<ObjectId>, message: String) -> ObjectId {
        let id = self.next_object_id();
        self.commits.insert(
            id.clone(),
            MockCommit {
                tree,
                parents,
                message,
            },
        );
        id
    }

    fn advance(&mut self, branch: &str, message: &str) -> ObjectId {
        let parent = self
            .refs
            .get(branch)
            .cloned()
            .unwrap_or_else(|| panic!("branch {branch} does not exist"));
        let tree = self.commits[&parent].tree.clone();
        let commit = self.store_commit(tree, vec![parent], message.to_string());
        self.refs.insert(branch.to_string(), commit.clone());
        commit
    }

    /// Build a tree from `items` overlaid on `base`, storing new objects.
    fn build_tree(
        &mut self,
        base: Option<&ObjectId>,
        items: &[TreeItem],
    ) -> Result<ObjectId, ForgeError> {
        let mut entries = match base {
            Some(sha) => self
                .trees
                .get(sha)
                .cloned()
                .ok_or_else(|| ForgeError::Validation(format!("base_tree {} does not exist", sha)))?,
            None => BTreeMap::new(),
        };

        // Items with a nested path are grouped under their first component.
        let mut nested: BTreeMap<String, Vec<TreeItem>> = BTreeMap::new();
        for item in items {
            match item.path.split_once('/') {
                Some((dir, rest)) => nested.entry(dir.to_string()).or_default().push(TreeItem {
                    path: rest.to_string(),
                    ..item.clone()
                }),
                None => {
                    let entry = self.entry_for(item)?;
                    entries.insert(item.path.clone(), entry);
                }
            }
        }

        for (dir, sub_items) in nested {
            let sub_base = entries
                .get(&dir)
                .filter(|e| e.kind == ObjectKind::Tree)
                .map(|e| e.sha.clone());
            let sha = self.build_tree(sub_base.as_ref(), &sub_items)?;
            entries.insert(
                dir,
                MockEntry {
                    mode: ObjectMode::Directory,
                    kind: ObjectKind::Tree,
                    sha,
                },
            );
        }

        let id = self.next_object_id();
        self.trees.insert(id.clone(), entries);
        Ok(id)
    }

    fn entry_for(&mut self, item: &TreeItem) -> Result<MockEntry, ForgeError> {
        let sha = match (&item.content, &item.sha) {
            (Some(content), _) => self.store_blob(content.clone().into_bytes()),
            (None, Some(sha)) => {
                let exists = match item.kind {
                    ObjectKind::Blob => self.blobs.contains_key(sha),
                    ObjectKind::Tree => self.trees.contains_key(sha),
                };
                if !exists {
                    return Err(ForgeError::Validation(format!(
                        "{} {} for '{}' does not exist",
                        item.kind, sha, item.path
                    )));
                }
                sha.clone()
            }
            (None, None) => {
                return Err(ForgeError::Validation(format!(
                    "'{}' has neither content nor sha",
                    item.path
                )))
            }
        };
        Ok(MockEntry {
            mode: item.mode,
            kind: item.kind,
            sha,
        })
    }

    fn lookup(&self, commit: &ObjectId, path: &str) -> Option<MockEntry> {
        let mut tree = self.commits.get(commit)?.tree.clone();
        let mut parts = path.split('/').peekable();
        while let Some(part) = parts.next() {
            let entry = self.trees.get(&tree)?.get(part)?.clone();
            if parts.peek().is_none() {
                return Some(entry);
            }
            tree = entry.sha;
        }
        None
    }

    fn collect_paths(&self, tree: &ObjectId, prefix: &str, out: &mut Vec<String>) {
        let Some(entries) = self.trees.get(tree) else {
            return;
        };
        for (name, entry) in entries {
            let path = format!("{prefix}{name}");
            match entry.kind {
                ObjectKind::Tree => self.collect_paths(&entry.sha, &format!("{path}/"), out),
                ObjectKind::Blob => out.push(path),
            }
        }
    }

    fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![descendant.clone()];
        while let Some(sha) = stack.pop() {
            if &sha == ancestor {
                return true;
            }
            if seen.insert(sha.clone()) {
                if let Some(c) = self.commits.get(&sha) {
                    stack.extend(c.parents.iter().cloned());
                }
            }
        }
        false
    }
}

#[async_trait]
impl GitDataForge for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_latest_commit(&self, coords: &RepoCoordinates) -> Result<ObjectId, ForgeError> {
        let mut inner = self.lock();
        let branch = coords.branch().as_str().to_string();
        inner.operations.push(MockOperation::FetchLatestCommit {
            branch: branch.clone(),
        });
        inner.take_failure(|f| match f {
            FailOn::FetchLatestCommit(e) => Some(e),
            _ => None,
        })?;
        inner
            .refs
            .get(&branch)
            .cloned()
            .ok_or(ForgeError::RefNotFound(branch))
    }

    async fn fetch_base_tree(
        &self,
        _coords: &RepoCoordinates,
        commit: &ObjectId,
    ) -> Result<ObjectId, ForgeError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::FetchBaseTree {
            commit: commit.clone(),
        });
        inner.take_failure(|f| match f {
            FailOn::FetchBaseTree(e) => Some(e),
            _ => None,
        })?;
        inner
            .commits
            .get(commit)
            .map(|c| c.tree.clone())
            .ok_or_else(|| ForgeError::CommitNotFound(commit.to_string()))
    }

    async fn create_tree(
        &self,
        _coords: &RepoCoordinates,
        base_tree: Option<&ObjectId>,
        items: &[TreeItem],
    ) -> Result<ObjectId, ForgeError> {
        validate_tree_items(items)?;
        let mut inner = self.lock();
        inner.operations.push(MockOperation::CreateTree {
            base_tree: base_tree.cloned(),
            paths: items.iter().map(|i| i.path.clone()).collect(),
        });
        inner.take_failure(|f| match f {
            FailOn::CreateTree(e) => Some(e),
            _ => None,
        })?;
        inner.build_tree(base_tree, items)
    }

    async fn create_commit(
        &self,
        _coords: &RepoCoordinates,
        tree: &ObjectId,
        parent: &ObjectId,
        message: &str,
    ) -> Result<ObjectId, ForgeError> {
        validate_commit_message(message)?;
        let mut inner = self.lock();
        inner.operations.push(MockOperation::CreateCommit {
            tree: tree.clone(),
            parent: parent.clone(),
            message: message.to_string(),
        });
        inner.take_failure(|f| match f {
            FailOn::CreateCommit(e) => Some(e),
            _ => None,
        })?;
        if !inner.trees.contains_key(tree) {
            return Err(ForgeError::Validation(format!("tree {} does not exist", tree)));
        }
        if !inner.commits.contains_key(parent) {
            return Err(ForgeError::Validation(format!(
                "parent {} does not exist",
                parent
            )));
        }
        Ok(inner.store_commit(tree.clone(), vec![parent.clone()], message.to_string()))
    }

    async fn update_ref(
        &self,
        coords: &RepoCoordinates,
        commit: &ObjectId,
        force: bool,
    ) -> Result<(), ForgeError> {
        let mut inner = self.lock();
        let branch = coords.branch().as_str().to_string();
        inner.operations.push(MockOperation::UpdateRef {
            branch: branch.clone(),
            commit: commit.clone(),
            force,
        });
        if let Some(pushed) = inner.concurrent_push.take() {
            inner.advance(&pushed, "concurrent push");
        }
        inner.take_failure(|f| match f {
            FailOn::UpdateRef(e) => Some(e),
            _ => None,
        })?;

        let tip = inner
            .refs
            .get(&branch)
            .cloned()
            .ok_or_else(|| ForgeError::RefNotFound(branch.clone()))?;
        if !inner.commits.contains_key(commit) {
            return Err(ForgeError::Validation("Object does not exist".into()));
        }
        if !force && !inner.is_ancestor(&tip, commit) {
            return Err(ForgeError::RefUpdateRejected(
                "Update is not a fast forward".into(),
            ));
        }
        inner.refs.insert(branch, commit.clone());
        Ok(())
    }

    async fn create_blob(
        &self,
        _coords: &RepoCoordinates,
        content: &[u8],
    ) -> Result<ObjectId, ForgeError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::CreateBlob {
            size: content.len(),
        });
        inner.take_failure(|f| match f {
            FailOn::CreateBlob(e) => Some(e),
            _ => None,
        })?;
        Ok(inner.store_blob(content.to_vec()))
    }

    async fn fetch_tree(
        &self,
        _coords: &RepoCoordinates,
        tree: &ObjectId,
    ) -> Result<Vec<RemoteTreeEntry>, ForgeError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::FetchTree { tree: tree.clone() });
        inner.take_failure(|f| match f {
            FailOn::FetchTree(e) => Some(e),
            _ => None,
        })?;
        let entries = inner
            .trees
            .get(tree)
            .ok_or_else(|| ForgeError::NotFound(format!("tree {}", tree)))?;
        Ok(entries
            .iter()
            .map(|(name, e)| RemoteTreeEntry {
                path: name.clone(),
                mode: e.mode.as_str().to_string(),
                kind: e.kind.to_string(),
                sha: e.sha.clone(),
                size: inner.blobs.get(&e.sha).map(|b| b.len() as u64),
            })
            .collect())
    }
}
