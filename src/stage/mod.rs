//! stage
//!
//! Turns local paths into tree entries for the remote object API.
//!
//! # Architecture
//!
//! Staging happens in two phases so that every local failure surfaces before
//! the first network request:
//!
//! 1. [`TreeItemBuilder::stage`] reads the filesystem only. Each path is
//!    classified ([`classify`]) and its content read, producing
//!    [`StagedEntry`] values. Directories are walked recursively.
//! 2. [`TreeItemBuilder::resolve`] turns staged entries into [`TreeItem`]s.
//!    Text blobs are embedded directly. Binary blobs and nested directories
//!    need remote identifiers, so they are uploaded bottom-up through the
//!    forge.
//!
//! Output order always matches input order.

mod builder;
pub mod classify;
mod item;

use std::path::PathBuf;

use thiserror::Error;

pub use builder::{BinaryPolicy, BlobContent, StagedEntry, TreeItemBuilder};
pub use classify::{classify, ObjectKind, ObjectMode};
pub use item::TreeItem;

/// Errors from reading local paths.
#[derive(Debug, Error)]
pub enum StageError {
    /// The path is a socket, fifo, device or other unsupported entry.
    #[error("unsupported file type at '{}'", path.display())]
    UnsupportedFileType { path: PathBuf },

    /// The path could not be opened or read.
    #[error("failed to read '{}': {source}", path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// File content is not valid UTF-8 and binary upload is disabled.
    #[error("'{}' is not valid UTF-8 text; enable binary uploads to commit it", path.display())]
    Encoding { path: PathBuf },

    /// A directory that cannot be turned into a tree.
    #[error("cannot commit '{}' as a tree: {reason}", path.display())]
    UnsupportedNestedTree { path: PathBuf, reason: String },

    /// A relative path that escapes the root or is otherwise unusable.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}
