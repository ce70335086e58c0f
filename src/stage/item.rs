//! stage::item
//!
//! The tree entry sent to the remote when creating a tree.

use serde::Serialize;

use super::classify::{ObjectKind, ObjectMode};
use crate::core::types::ObjectId;

/// One filesystem entry staged for commit.
///
/// Serializes to the `tree[]` element of a create-tree request:
/// `{path, mode, type, content}` when content is embedded, or
/// `{path, mode, type, sha}` when the object already exists remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeItem {
    /// Slash-separated path relative to the tree being created.
    pub path: String,
    pub mode: ObjectMode,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<ObjectId>,
}

impl TreeItem {
    /// A blob whose text content is embedded in the request.
    pub fn with_content(path: impl Into<String>, mode: ObjectMode, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode,
            kind: ObjectKind::Blob,
            content: Some(content.into()),
            sha: None,
        }
    }

    /// An entry referencing an object that already exists remotely.
    pub fn with_sha(
        path: impl Into<String>,
        mode: ObjectMode,
        kind: ObjectKind,
        sha: ObjectId,
    ) -> Self {
        Self {
            path: path.into(),
            mode,
            kind,
            content: None,
            sha: Some(sha),
        }
    }

    /// Check the item is well formed before it goes on the wire.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() {
            return Err("tree item path cannot be empty".into());
        }
        if self.path.starts_with('/') || self.path.ends_with('/') {
            return Err(format!("tree item path '{}' must be relative", self.path));
        }
        if self
            .path
            .split('/')
            .any(|c| c.is_empty() || c == "." || c == "..")
        {
            return Err(format!(
                "tree item path '{}' contains an empty or relative component",
                self.path
            ));
        }

        let expected_kind = match self.mode {
            ObjectMode::Normal | ObjectMode::Executable | ObjectMode::Symlink => ObjectKind::Blob,
            ObjectMode::Directory => ObjectKind::Tree,
        };
        if self.kind != expected_kind {
            return Err(format!(
                "'{}': mode {} requires type {}, got {}",
                self.path, self.mode, expected_kind, self.kind
            ));
        }

        match (self.kind, &self.content, &self.sha) {
            (_, Some(_), Some(_)) => Err(format!(
                "'{}': content and sha are mutually exclusive",
                self.path
            )),
            (ObjectKind::Blob, None, None) => {
                Err(format!("'{}': blob requires content or sha", self.path))
            }
            (ObjectKind::Tree, Some(_), _) => {
                Err(format!("'{}': tree cannot embed content", self.path))
            }
            (ObjectKind::Tree, None, None) => Err(format!("'{}': tree requires sha", self.path)),
            _ => Ok(()),
        }
    }
}
