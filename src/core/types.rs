//! core::types
//!
//! Strong types for the values that flow through a remote commit.
//!
//! # Types
//!
//! - [`ObjectId`] - Content-addressed object identifier returned by the remote
//! - [`BranchName`] - Validated Git branch name
//! - [`RepoCoordinates`] - Owner, repository and branch a client is bound to
//!
//! # Validation
//!
//! These types enforce validity at construction time. A malformed SHA coming
//! back from the remote is rejected at the parse boundary instead of being
//! forwarded into the next request.
//!
//! # Examples
//!
//! ```
//! use treepush::core::types::{BranchName, ObjectId, RepoCoordinates};
//!
//! let sha = ObjectId::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
//! assert_eq!(sha.as_str(), "abc123def4567890abc123def4567890abc12345");
//!
//! let coords = RepoCoordinates::new("octocat", "hello-world", BranchName::new("main").unwrap());
//! assert_eq!(coords.branch().as_str(), "main");
//!
//! assert!(ObjectId::new("not-a-sha").is_err());
//! assert!(BranchName::new("invalid..name").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("invalid repository coordinate: {0}")]
    InvalidCoordinate(String),
}

/// A Git object identifier (SHA-1 or SHA-256 hex).
///
/// Identifiers are normalized to lowercase so that two spellings of the same
/// object compare equal.
///
/// # Example
///
/// ```
/// use treepush::core::types::ObjectId;
///
/// let id = ObjectId::new("aa218f56b14c9653891f9e74264a383fa43fefbd").unwrap();
/// assert_eq!(id.short(7), "aa218f5");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidObjectId` if the string is not 40 or 64 hex
    /// characters.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into().to_ascii_lowercase();
        if id.len() != 40 && id.len() != 64 {
            return Err(TypeError::InvalidObjectId(format!(
                "expected 40 or 64 hex characters, got {}",
                id.len()
            )));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidObjectId(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Get an abbreviated form of the id, for log lines.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated Git branch name.
///
/// Follows the subset of `git check-ref-format` rules that matter when the
/// name is interpolated into `refs/heads/<branch>` API paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Branch used when the caller does not choose one.
    pub const DEFAULT: &'static str = "master";

    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name).map_err(|reason| TypeError::InvalidBranchName(reason.into()))?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), &'static str> {
        if name.is_empty() {
            return Err("branch name cannot be empty");
        }
        if name == "@" {
            return Err("branch name cannot be '@'");
        }
        if name.starts_with('-') {
            return Err("branch name cannot start with '-'");
        }
        if name.ends_with('/') {
            return Err("branch name cannot end with '/'");
        }
        for pattern in ["..", "@{", "//"] {
            if name.contains(pattern) {
                return Err("branch name contains a forbidden sequence");
            }
        }
        const INVALID_CHARS: [char; 9] = [' ', '~', '^', ':', '\\', '?', '*', '[', '#'];
        if name
            .chars()
            .any(|c| c.is_ascii_control() || INVALID_CHARS.contains(&c))
        {
            return Err("branch name contains a forbidden character");
        }
        for component in name.split('/') {
            if component.starts_with('.') {
                return Err("path component cannot start with '.'");
            }
            if component.ends_with(".lock") {
                return Err("path component cannot end with '.lock'");
            }
        }
        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BranchName {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The repository a client commits into.
///
/// Set once at construction and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    owner: String,
    repo: String,
    branch: BranchName,
}

impl RepoCoordinates {
    /// Create coordinates without validating owner and repo.
    ///
    /// Prefer [`RepoCoordinates::parse`] for values that come from users.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, branch: BranchName) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch,
        }
    }

    /// Create validated coordinates.
    ///
    /// Owner and repository must be non-empty and must not contain `/`,
    /// whitespace or `?`, since both are interpolated into API paths.
    pub fn parse(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let owner = owner.into();
        let repo = repo.into();
        for (label, value) in [("owner", &owner), ("repository", &repo)] {
            if value.is_empty() {
                return Err(TypeError::InvalidCoordinate(format!(
                    "{label} cannot be empty"
                )));
            }
            if value
                .chars()
                .any(|c| c == '/' || c == '?' || c == '#' || c.is_whitespace())
            {
                return Err(TypeError::InvalidCoordinate(format!(
                    "{label} '{value}' contains a character not allowed in a URL path segment"
                )));
            }
        }
        Ok(Self {
            owner,
            repo,
            branch: BranchName::new(branch)?,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn branch(&self) -> &BranchName {
        &self.branch
    }
}

impl std::fmt::Display for RepoCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}
