//! forge::traits
//!
//! The remote object gateway: the read/write calls against a hosted
//! repository's Git object graph.
//!
//! # Design
//!
//! The trait is async because every operation is a network round trip. Each
//! call is a single attempt; nothing here retries. Commits are built by
//! invoking the five core operations in a fixed order (see
//! [`crate::commit::Pipeline`], which enforces that order in its types):
//!
//! 1. [`fetch_latest_commit`](GitDataForge::fetch_latest_commit)
//! 2. [`fetch_base_tree`](GitDataForge::fetch_base_tree)
//! 3. [`create_tree`](GitDataForge::create_tree)
//! 4. [`create_commit`](GitDataForge::create_commit)
//! 5. [`update_ref`](GitDataForge::update_ref)
//!
//! The server keeps no transaction across these calls. A failure after
//! step 3 leaves unreferenced trees or commits on the remote; they are
//! harmless and are not cleaned up.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::core::types::{ObjectId, RepoCoordinates};
use crate::stage::TreeItem;

/// Errors from gateway operations.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// Credentials were rejected or lack permission.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The branch does not exist.
    #[error("branch not found: {0}")]
    RefNotFound(String),

    /// The commit does not exist.
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// Some other resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request payload was rejected as malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A non-fast-forward update was attempted without force.
    #[error("ref update rejected: {0}")]
    RefUpdateRejected(String),

    /// The remote reported a concurrent modification.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an unexpected error or an unparseable body.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// An entry of an existing remote tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTreeEntry {
    pub path: String,
    /// Mode as reported by the remote (may include `160000` for submodules).
    pub mode: String,
    /// `blob`, `tree` or `commit`.
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: ObjectId,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Check tree items before they are sent.
pub fn validate_tree_items(items: &[TreeItem]) -> Result<(), ForgeError> {
    items
        .iter()
        .try_for_each(|item| item.validate().map_err(ForgeError::Validation))
}

/// Check a commit message before it is sent.
pub fn validate_commit_message(message: &str) -> Result<(), ForgeError> {
    if message.trim().is_empty() {
        return Err(ForgeError::Validation(
            "commit message cannot be empty".into(),
        ));
    }
    Ok(())
}

/// Read and write access to a remote repository's object graph.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` and hold no per-commit state, so a
/// single instance can serve independent commits to different branches
/// concurrently.
///
/// # Errors
///
/// - `AuthFailed`: credentials rejected
/// - `RefNotFound` / `CommitNotFound` / `NotFound`: missing objects
/// - `Validation`: malformed payload, detected locally or by the remote
/// - `RefUpdateRejected` / `Conflict`: the branch could not be moved
/// - `Transport`: the request never got a response (including timeouts)
#[async_trait]
pub trait GitDataForge: Send + Sync {
    /// Get the forge name (e.g., "github").
    fn name(&self) -> &'static str;

    /// Get the sha of the commit at the tip of `coords.branch()`.
    async fn fetch_latest_commit(&self, coords: &RepoCoordinates) -> Result<ObjectId, ForgeError>;

    /// Get the sha of the tree a commit points at.
    async fn fetch_base_tree(
        &self,
        coords: &RepoCoordinates,
        commit: &ObjectId,
    ) -> Result<ObjectId, ForgeError>;

    /// Create a tree from `items` overlaid on `base_tree`.
    ///
    /// Entries of the base tree not named by `items` are inherited unchanged.
    /// With no base tree the result contains exactly `items`.
    async fn create_tree(
        &self,
        coords: &RepoCoordinates,
        base_tree: Option<&ObjectId>,
        items: &[TreeItem],
    ) -> Result<ObjectId, ForgeError>;

    /// Create a commit of `tree` whose sole parent is `parent`.
    async fn create_commit(
        &self,
        coords: &RepoCoordinates,
        tree: &ObjectId,
        parent: &ObjectId,
        message: &str,
    ) -> Result<ObjectId, ForgeError>;

    /// Move `coords.branch()` to `commit`.
    ///
    /// Without `force` only fast-forward updates are accepted.
    async fn update_ref(
        &self,
        coords: &RepoCoordinates,
        commit: &ObjectId,
        force: bool,
    ) -> Result<(), ForgeError>;

    /// Upload raw bytes as a blob and return its sha.
    async fn create_blob(
        &self,
        coords: &RepoCoordinates,
        content: &[u8],
    ) -> Result<ObjectId, ForgeError>;

    /// List the direct entries of a tree.
    async fn fetch_tree(
        &self,
        coords: &RepoCoordinates,
        tree: &ObjectId,
    ) -> Result<Vec<RemoteTreeEntry>, ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::ObjectMode;

    #[test]
    fn empty_message_rejected() {
        assert!(matches!(
            validate_commit_message(""),
            Err(ForgeError::Validation(_))
        ));
        assert!(validate_commit_message("  \n").is_err());
        assert!(validate_commit_message("msg").is_ok());
    }

    #[test]
    fn malformed_item_rejected() {
        let mut bad = TreeItem::with_content("a.txt", ObjectMode::Normal, "x");
        bad.content = None;
        let good = TreeItem::with_content("b.txt", ObjectMode::Normal, "y");
        assert!(validate_tree_items(&[good.clone()]).is_ok());
        assert!(matches!(
            validate_tree_items(&[good, bad]),
            Err(ForgeError::Validation(msg)) if msg.contains("a.txt")
        ));
    }

    #[test]
    fn remote_tree_entry_parses() {
        let entry: RemoteTreeEntry = serde_json::from_value(serde_json::json!({
            "path": "README.md",
            "mode": "100644",
            "type": "blob",
            "sha": "a".repeat(40),
            "size": 12,
            "url": "https://api.github.com/..."
        }))
        .unwrap();
        assert_eq!(entry.kind, "blob");
        assert_eq!(entry.size, Some(12));
    }

    #[test]
    fn forge_error_display() {
        assert_eq!(
            ForgeError::RefNotFound("main".into()).to_string(),
            "branch not found: main"
        );
        assert_eq!(
            ForgeError::Api {
                status: 502,
                message: "Bad Gateway".into()
            }
            .to_string(),
            "API error: 502 - Bad Gateway"
        );
        assert_eq!(
            ForgeError::Transport("request timed out".into()).to_string(),
            "transport error: request timed out"
        );
    }
}
