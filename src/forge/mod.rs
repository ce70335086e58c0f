//! forge
//!
//! Gateways to hosted repositories' Git object APIs.
//!
//! # Modules
//!
//! - `traits`: the [`GitDataForge`] trait, [`ForgeError`] and shared payload checks
//! - [`github`]: GitHub implementation over the Git Data REST API
//! - [`mock`]: in-memory object graph for deterministic testing
//!
//! # Example
//!
//! ```ignore
//! use treepush::auth::Credential;
//! use treepush::forge::{github::GitHubForge, GitDataForge};
//!
//! let forge = GitHubForge::new(Credential::Token(token));
//! let tip = forge.fetch_latest_commit(&coords).await?;
//! let base = forge.fetch_base_tree(&coords, &tip).await?;
//! ```

pub mod github;
pub mod mock;
mod traits;

pub use traits::*;
