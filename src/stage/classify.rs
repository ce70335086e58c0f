//! stage::classify
//!
//! Maps on-disk metadata to a Git object kind and tree entry mode.
//!
//! # Policy
//!
//! - Regular file: `blob`, mode `100755` when the permission bits are exactly
//!   `0o755`, otherwise `100644`. The policy is binary; no other permission
//!   pattern is distinguished.
//! - Directory: `tree`, mode `040000`.
//! - Symbolic link: mode `120000`, `tree` when the link resolves to a
//!   directory, otherwise `blob` (dangling links included).
//! - Anything else (sockets, fifos, devices) is unsupported.
//!
//! The link itself is inspected, never its target, except to decide the kind
//! of a symlink.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::StageError;

/// Permission bits that mark a regular file as executable.
const ALL_EXECUTE: u32 = 0o755;

/// Mode of a tree entry, as the remote API spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectMode {
    #[serde(rename = "100644")]
    Normal,
    #[serde(rename = "100755")]
    Executable,
    #[serde(rename = "040000")]
    Directory,
    #[serde(rename = "120000")]
    Symlink,
}

impl ObjectMode {
    /// Every mode the classifier can produce.
    pub const ALL: [ObjectMode; 4] = [
        ObjectMode::Normal,
        ObjectMode::Executable,
        ObjectMode::Directory,
        ObjectMode::Symlink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectMode::Normal => "100644",
            ObjectMode::Executable => "100755",
            ObjectMode::Directory => "040000",
            ObjectMode::Symlink => "120000",
        }
    }
}

impl std::fmt::Display for ObjectMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of object a tree entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Blob => write!(f, "blob"),
            ObjectKind::Tree => write!(f, "tree"),
        }
    }
}

/// Classify the filesystem entry at `path`.
///
/// # Errors
///
/// - `StageError::FileRead` if the metadata cannot be read
/// - `StageError::UnsupportedFileType` for sockets, fifos and devices
pub fn classify(path: &Path) -> Result<(ObjectMode, ObjectKind), StageError> {
    let meta = fs::symlink_metadata(path).map_err(|source| StageError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let file_type = meta.file_type();

    if file_type.is_file() {
        let mode = if permission_bits(&meta) == ALL_EXECUTE {
            ObjectMode::Executable
        } else {
            ObjectMode::Normal
        };
        Ok((mode, ObjectKind::Blob))
    } else if file_type.is_dir() {
        Ok((ObjectMode::Directory, ObjectKind::Tree))
    } else if file_type.is_symlink() {
        // fs::metadata follows the link; a dangling link is not a directory.
        let points_at_dir = fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false);
        let kind = if points_at_dir {
            ObjectKind::Tree
        } else {
            ObjectKind::Blob
        };
        Ok((ObjectMode::Symlink, kind))
    } else {
        Err(StageError::UnsupportedFileType {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> u32 {
    0o644
}
