//! commit::pipeline
//!
//! The five dependent gateway calls as a chain of stage types.
//!
//! Each stage owns the identifiers produced so far and exposes only the next
//! call, consuming itself. A commit cannot be created before its tree exists,
//! and a ref cannot be moved before its commit exists, because there is no
//! value to call those methods on until the previous step has returned.
//!
//! ```text
//! Pipeline ──fetch_latest_commit──▶ LatestCommit ──fetch_base_tree──▶ BaseTree
//!   ──create_tree──▶ NewTree ──create_commit──▶ NewCommit ──update_ref──▶ CommitOutcome
//! ```
//!
//! Stages are plain values; dropping one abandons the commit between steps.

use super::{CommitError, CommitOutcome};
use crate::core::types::{ObjectId, RepoCoordinates};
use crate::forge::{ForgeError, GitDataForge};
use crate::stage::TreeItem;

/// Start of a commit against one branch.
pub struct Pipeline<'a, F: GitDataForge + ?Sized> {
    forge: &'a F,
    coords: &'a RepoCoordinates,
}

/// The branch tip has been read.
pub struct LatestCommit<'a, F: GitDataForge + ?Sized> {
    forge: &'a F,
    coords: &'a RepoCoordinates,
    parent: ObjectId,
}

/// The tip's tree has been read.
pub struct BaseTree<'a, F: GitDataForge + ?Sized> {
    forge: &'a F,
    coords: &'a RepoCoordinates,
    parent: ObjectId,
    base_tree: ObjectId,
}

/// The new tree exists on the remote.
pub struct NewTree<'a, F: GitDataForge + ?Sized> {
    forge: &'a F,
    coords: &'a RepoCoordinates,
    parent: ObjectId,
    base_tree: ObjectId,
    tree: ObjectId,
}

/// The new commit exists on the remote but no ref points at it yet.
pub struct NewCommit<'a, F: GitDataForge + ?Sized> {
    forge: &'a F,
    coords: &'a RepoCoordinates,
    parent: ObjectId,
    base_tree: ObjectId,
    tree: ObjectId,
    commit: ObjectId,
}

impl<'a, F: GitDataForge + ?Sized> Pipeline<'a, F> {
    pub fn new(forge: &'a F, coords: &'a RepoCoordinates) -> Self {
        Self { forge, coords }
    }

    pub async fn fetch_latest_commit(self) -> Result<LatestCommit<'a, F>, CommitError> {
        let parent = self.forge.fetch_latest_commit(self.coords).await?;
        tracing::debug!(branch = %self.coords.branch(), parent = %parent.short(7), "fetched branch tip");
        Ok(LatestCommit {
            forge: self.forge,
            coords: self.coords,
            parent,
        })
    }
}

impl<'a, F: GitDataForge + ?Sized> LatestCommit<'a, F> {
    pub fn parent(&self) -> &ObjectId {
        &self.parent
    }

    pub async fn fetch_base_tree(self) -> Result<BaseTree<'a, F>, CommitError> {
        let base_tree = self.forge.fetch_base_tree(self.coords, &self.parent).await?;
        tracing::debug!(commit = %self.parent.short(7), tree = %base_tree.short(7), "fetched base tree");
        Ok(BaseTree {
            forge: self.forge,
            coords: self.coords,
            parent: self.parent,
            base_tree,
        })
    }
}

impl<'a, F: GitDataForge + ?Sized> BaseTree<'a, F> {
    pub fn parent(&self) -> &ObjectId {
        &self.parent
    }

    pub fn base_tree(&self) -> &ObjectId {
        &self.base_tree
    }

    /// Create a tree overlaying `items` on the base tree.
    pub async fn create_tree(self, items: &[TreeItem]) -> Result<NewTree<'a, F>, CommitError> {
        let tree = self
            .forge
            .create_tree(self.coords, Some(&self.base_tree), items)
            .await?;
        tracing::debug!(base = %self.base_tree.short(7), tree = %tree.short(7), items = items.len(), "created tree");
        Ok(NewTree {
            forge: self.forge,
            coords: self.coords,
            parent: self.parent,
            base_tree: self.base_tree,
            tree,
        })
    }
}

impl<'a, F: GitDataForge + ?Sized> NewTree<'a, F> {
    pub fn tree(&self) -> &ObjectId {
        &self.tree
    }

    pub async fn create_commit(self, message: &str) -> Result<NewCommit<'a, F>, CommitError> {
        let commit = self
            .forge
            .create_commit(self.coords, &self.tree, &self.parent, message)
            .await?;
        tracing::debug!(tree = %self.tree.short(7), commit = %commit.short(7), "created commit");
        Ok(NewCommit {
            forge: self.forge,
            coords: self.coords,
            parent: self.parent,
            base_tree: self.base_tree,
            tree: self.tree,
            commit,
        })
    }
}

impl<'a, F: GitDataForge + ?Sized> NewCommit<'a, F> {
    pub fn commit(&self) -> &ObjectId {
        &self.commit
    }

    /// Move the branch to the new commit.
    ///
    /// Without `force` the update must be a fast-forward. When the remote
    /// rejects it, the tip is read again: if another writer moved it since
    /// [`Pipeline::fetch_latest_commit`], the result is
    /// [`CommitError::Conflict`]. The branch is never moved on failure.
    pub async fn update_ref(self, force: bool) -> Result<CommitOutcome, CommitError> {
        match self.forge.update_ref(self.coords, &self.commit, force).await {
            Ok(()) => {
                tracing::info!(
                    branch = %self.coords.branch(),
                    commit = %self.commit.short(7),
                    force,
                    "updated branch"
                );
                Ok(CommitOutcome {
                    parent: self.parent,
                    base_tree: self.base_tree,
                    tree: self.tree,
                    commit: self.commit,
                })
            }
            Err(ForgeError::RefUpdateRejected(message)) if !force => {
                match self.forge.fetch_latest_commit(self.coords).await {
                    Ok(actual) if actual != self.parent => {
                        tracing::warn!(
                            branch = %self.coords.branch(),
                            expected = %self.parent.short(7),
                            actual = %actual.short(7),
                            "branch moved during commit"
                        );
                        Err(CommitError::Conflict {
                            branch: self.coords.branch().to_string(),
                            expected: self.parent,
                            actual,
                        })
                    }
                    _ => Err(ForgeError::RefUpdateRejected(message).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}
