//! stage::builder
//!
//! Builds the ordered list of tree items for a commit.

use std::fs;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::classify::{classify, ObjectKind, ObjectMode};
use super::item::TreeItem;
use super::StageError;
use crate::core::types::RepoCoordinates;
use crate::forge::{ForgeError, GitDataForge};

/// Directory names never descended into when staging a directory.
const SKIPPED_DIR_NAMES: [&str; 1] = [".git"];

/// What to do with files whose content is not UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryPolicy {
    /// Fail with `StageError::Encoding`.
    #[default]
    Reject,
    /// Upload the bytes as a blob and reference it by sha.
    Upload,
}

/// Content of a staged blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobContent {
    Text(String),
    Binary(Vec<u8>),
}

/// A locally read entry that has not yet been resolved against the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedEntry {
    Blob {
        path: String,
        mode: ObjectMode,
        content: BlobContent,
    },
    /// A directory with its children, in name order. Child paths are
    /// relative to the directory itself.
    Tree {
        path: String,
        children: Vec<StagedEntry>,
    },
}

impl StagedEntry {
    pub fn path(&self) -> &str {
        match self {
            StagedEntry::Blob { path, .. } | StagedEntry::Tree { path, .. } => path,
        }
    }
}

/// Builds tree items from paths relative to a local root.
#[derive(Debug, Clone)]
pub struct TreeItemBuilder {
    root: PathBuf,
    binary: BinaryPolicy,
}

impl TreeItemBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            binary: BinaryPolicy::default(),
        }
    }

    pub fn with_binary_policy(mut self, binary: BinaryPolicy) -> Self {
        self.binary = binary;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every path from disk, in order.
    ///
    /// Fails on the first path that cannot be staged; nothing is returned
    /// for the paths before it.
    pub fn stage<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<StagedEntry>, StageError> {
        paths
            .iter()
            .map(|relative| {
                let path = wire_path(relative.as_ref())?;
                self.stage_entry(&self.root.join(relative.as_ref()), path)
            })
            .collect()
    }

    fn stage_entry(&self, full_path: &Path, path: String) -> Result<StagedEntry, StageError> {
        let (mode, kind) = classify(full_path)?;
        match (mode, kind) {
            (ObjectMode::Symlink, ObjectKind::Blob) => {
                let target = fs::read_link(full_path).map_err(|source| StageError::FileRead {
                    path: full_path.to_path_buf(),
                    source,
                })?;
                let target = target.to_str().ok_or_else(|| StageError::Encoding {
                    path: full_path.to_path_buf(),
                })?;
                Ok(StagedEntry::Blob {
                    path,
                    mode,
                    content: BlobContent::Text(target.to_string()),
                })
            }
            (ObjectMode::Symlink, ObjectKind::Tree) => Err(StageError::UnsupportedNestedTree {
                path: full_path.to_path_buf(),
                reason: "symbolic links to directories are not followed".into(),
            }),
            (_, ObjectKind::Blob) => Ok(StagedEntry::Blob {
                path,
                mode,
                content: self.read_blob(full_path)?,
            }),
            (_, ObjectKind::Tree) => self.stage_directory(full_path, path),
        }
    }

    fn read_blob(&self, full_path: &Path) -> Result<BlobContent, StageError> {
        let bytes = fs::read(full_path).map_err(|source| StageError::FileRead {
            path: full_path.to_path_buf(),
            source,
        })?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(BlobContent::Text(text)),
            Err(err) => match self.binary {
                BinaryPolicy::Upload => Ok(BlobContent::Binary(err.into_bytes())),
                BinaryPolicy::Reject => Err(StageError::Encoding {
                    path: full_path.to_path_buf(),
                }),
            },
        }
    }

    fn stage_directory(&self, full_path: &Path, path: String) -> Result<StagedEntry, StageError> {
        let read_err = |source| StageError::FileRead {
            path: full_path.to_path_buf(),
            source,
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(full_path).map_err(read_err)? {
            let name = entry.map_err(read_err)?.file_name();
            let name = name.into_string().map_err(|_| StageError::Encoding {
                path: full_path.to_path_buf(),
            })?;
            if !SKIPPED_DIR_NAMES.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names.sort();

        let children = names
            .into_iter()
            .map(|name| self.stage_entry(&full_path.join(&name), name))
            .collect::<Result<Vec<_>, _>>()?;

        if children.is_empty() {
            return Err(StageError::UnsupportedNestedTree {
                path: full_path.to_path_buf(),
                reason: "git cannot store an empty directory".into(),
            });
        }
        Ok(StagedEntry::Tree { path, children })
    }

    /// Turn staged entries into tree items, uploading what cannot be embedded.
    ///
    /// Nested directories are created bottom-up as standalone trees (no base
    /// tree) and referenced by sha. Binary blobs are uploaded first and
    /// referenced by sha.
    pub async fn resolve<F: GitDataForge + ?Sized>(
        &self,
        forge: &F,
        coords: &RepoCoordinates,
        entries: Vec<StagedEntry>,
    ) -> Result<Vec<TreeItem>, ForgeError> {
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            items.push(resolve_entry(forge, coords, entry).await?);
        }
        Ok(items)
    }
}

fn resolve_entry<'a, F: GitDataForge + ?Sized>(
    forge: &'a F,
    coords: &'a RepoCoordinates,
    entry: StagedEntry,
) -> Pin<Box<dyn Future<Output = Result<TreeItem, ForgeError>> + Send + 'a>> {
    Box::pin(async move {
        match entry {
            StagedEntry::Blob {
                path,
                mode,
                content: BlobContent::Text(text),
            } => Ok(TreeItem::with_content(path, mode, text)),
            StagedEntry::Blob {
                path,
                mode,
                content: BlobContent::Binary(bytes),
            } => {
                let sha = forge.create_blob(coords, &bytes).await?;
                tracing::debug!(path = %path, sha = %sha.short(7), size = bytes.len(), "uploaded binary blob");
                Ok(TreeItem::with_sha(path, mode, ObjectKind::Blob, sha))
            }
            StagedEntry::Tree { path, children } => {
                let mut child_items = Vec::with_capacity(children.len());
                for child in children {
                    child_items.push(resolve_entry(forge, coords, child).await?);
                }
                let sha = forge.create_tree(coords, None, &child_items).await?;
                tracing::debug!(path = %path, sha = %sha.short(7), entries = child_items.len(), "created subtree");
                Ok(TreeItem::with_sha(
                    path,
                    ObjectMode::Directory,
                    ObjectKind::Tree,
                    sha,
                ))
            }
        }
    })
}

/// Convert a caller-supplied relative path into the slash-separated form
/// used on the wire.
fn wire_path(relative: &Path) -> Result<String, StageError> {
    let display = relative.to_string_lossy().into_owned();
    let invalid = |reason: &str| StageError::InvalidPath {
        path: display.clone(),
        reason: reason.to_string(),
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                parts.push(part.to_str().ok_or_else(|| invalid("path is not valid UTF-8"))?)
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("path cannot contain '..'")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative to the local root"))
            }
        }
    }
    if parts.is_empty() {
        return Err(invalid("path cannot be empty"));
    }
    Ok(parts.join("/"))
}
