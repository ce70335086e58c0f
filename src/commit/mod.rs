//! commit
//!
//! Commits local paths to a remote branch.
//!
//! # Flow
//!
//! [`Committer::commit_paths`] runs one commit end to end:
//!
//! 1. Validate the message and read every path from disk. Local failures
//!    surface here, before any request is made.
//! 2. Read the branch tip and its tree.
//! 3. Upload what cannot be embedded (binary blobs, nested directories).
//! 4. Create the overlay tree, the commit, and move the branch.
//!
//! Steps 2 and 4 go through [`Pipeline`], whose stage types fix the call
//! order.
//!
//! # Failure
//!
//! Every error is returned on first occurrence; nothing is retried. A failure
//! after the first object is created can leave unreferenced objects on the
//! remote, but the branch only moves on full success. Retrying means calling
//! `commit_paths` again from the start.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use treepush::commit::Committer;
//! use treepush::core::types::RepoCoordinates;
//! use treepush::forge::mock::MockForge;
//! use treepush::stage::TreeItemBuilder;
//!
//! # tokio_test::block_on(async {
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
//!
//! let forge = MockForge::new();
//! forge.seed_branch("main", &[]);
//!
//! let coords = RepoCoordinates::parse("octocat", "hello", "main").unwrap();
//! let committer = Committer::new(Arc::new(forge.clone()), coords, TreeItemBuilder::new(dir.path()));
//! let outcome = committer.commit_paths(&["a.txt"], "add a.txt", false).await.unwrap();
//!
//! assert_eq!(forge.read_file(&outcome.commit, "a.txt").as_deref(), Some("hello"));
//! # });
//! ```

mod pipeline;

pub use pipeline::{BaseTree, LatestCommit, NewCommit, NewTree, Pipeline};

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::core::config::{ClientConfig, ConfigError};
use crate::core::types::{ObjectId, RepoCoordinates};
use crate::forge::github::GitHubForge;
use crate::forge::{validate_commit_message, ForgeError, GitDataForge};
use crate::stage::{StageError, TreeItemBuilder};

/// Errors from a commit operation.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No paths were given.
    #[error("nothing to commit: no paths given")]
    NoPaths,

    /// Another writer moved the branch between reading the tip and updating it.
    #[error("branch '{branch}' moved from {expected} to {actual} during commit")]
    Conflict {
        branch: String,
        expected: ObjectId,
        actual: ObjectId,
    },
}

/// Coarse classification of a [`CommitError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported file type, unreadable file, non-text content, bad path.
    FileSystem,
    Authentication,
    /// Network failure or timeout.
    Transport,
    /// Branch, commit or object missing.
    NotFound,
    /// Malformed request payload, from local checks or the remote.
    Validation,
    /// The branch moved concurrently.
    Conflict,
    /// Non-fast-forward update without force.
    RefUpdateRejected,
    Configuration,
    /// Rate limiting or an unexpected remote response.
    Remote,
}

impl CommitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommitError::Stage(_) => ErrorKind::FileSystem,
            CommitError::Config(_) => ErrorKind::Configuration,
            CommitError::NoPaths => ErrorKind::Validation,
            CommitError::Conflict { .. } => ErrorKind::Conflict,
            CommitError::Forge(e) => match e {
                ForgeError::AuthFailed(_) => ErrorKind::Authentication,
                ForgeError::RefNotFound(_)
                | ForgeError::CommitNotFound(_)
                | ForgeError::NotFound(_) => ErrorKind::NotFound,
                ForgeError::Validation(_) => ErrorKind::Validation,
                ForgeError::Conflict(_) => ErrorKind::Conflict,
                ForgeError::RefUpdateRejected(_) => ErrorKind::RefUpdateRejected,
                ForgeError::Transport(_) => ErrorKind::Transport,
                ForgeError::RateLimited | ForgeError::Api { .. } => ErrorKind::Remote,
            },
        }
    }
}

/// Identifiers produced by one successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Branch tip the commit was built on.
    pub parent: ObjectId,
    /// Tree of `parent`.
    pub base_tree: ObjectId,
    /// New tree: `base_tree` overlaid with the committed paths.
    pub tree: ObjectId,
    /// New commit, now the branch tip.
    pub commit: ObjectId,
}

/// Commits local paths to one branch through a forge.
///
/// Holds only read-only state; independent commits may run concurrently.
pub struct Committer {
    forge: Arc<dyn GitDataForge>,
    coords: RepoCoordinates,
    builder: TreeItemBuilder,
}

impl std::fmt::Debug for Committer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Committer")
            .field("forge", &self.forge.name())
            .field("coords", &self.coords)
            .field("builder", &self.builder)
            .finish()
    }
}

impl Committer {
    pub fn new(
        forge: Arc<dyn GitDataForge>,
        coords: RepoCoordinates,
        builder: TreeItemBuilder,
    ) -> Self {
        Self {
            forge,
            coords,
            builder,
        }
    }

    /// A committer talking to GitHub as described by `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, CommitError> {
        let forge = GitHubForge::from_config(config)?;
        tracing::debug!(
            repo = %config.coordinates(),
            auth = config.credential().mode(),
            api_base = config.api_base(),
            "created committer"
        );
        Ok(Self::new(
            Arc::new(forge),
            config.coordinates().clone(),
            config.tree_builder(),
        ))
    }

    pub fn coordinates(&self) -> &RepoCoordinates {
        &self.coords
    }

    pub fn forge(&self) -> &dyn GitDataForge {
        self.forge.as_ref()
    }

    /// Commit `paths` (relative to the local root) onto the branch.
    ///
    /// Paths not listed keep their content from the current tip. With
    /// `force`, the branch is moved even if that discards commits pushed
    /// since the tip was read.
    ///
    /// # Errors
    ///
    /// An empty message or path list fails before any request. Filesystem
    /// errors also fail before any request. See [`ErrorKind`] for the rest.
    pub async fn commit_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
        message: &str,
        force: bool,
    ) -> Result<CommitOutcome, CommitError> {
        validate_commit_message(message)?;
        if paths.is_empty() {
            return Err(CommitError::NoPaths);
        }
        let staged = self.builder.stage(paths)?;
        tracing::debug!(repo = %self.coords, entries = staged.len(), "staged local paths");

        let forge = self.forge.as_ref();
        let base = Pipeline::new(forge, &self.coords)
            .fetch_latest_commit()
            .await?
            .fetch_base_tree()
            .await?;

        let items = self.builder.resolve(forge, &self.coords, staged).await?;

        base.create_tree(&items)
            .await?
            .create_commit(message)
            .await?
            .update_ref(force)
            .await
    }
}
