//! treepush - commit local files to a GitHub branch without a working copy
//!
//! treepush drives a hosted repository's Git object API directly: it reads
//! local paths, creates tree and commit objects on the remote, and moves a
//! branch to the new commit. No clone, index or local object store is
//! involved.
//!
//! # Architecture
//!
//! - [`stage`] - Classify local paths and build tree items (filesystem only)
//! - [`forge`] - Remote object gateway: GitHub over REST, and an in-memory mock
//! - [`commit`] - The ordered commit pipeline and its orchestration
//! - [`core`] - Domain types and configuration
//! - [`auth`] - Credential selection
//!
//! # Invariants
//!
//! 1. Local failures surface before the first network request
//! 2. Pipeline steps run strictly in order; each consumes the previous result
//! 3. The branch moves only when every step has succeeded
//! 4. Without force, a branch that moved concurrently is never overwritten
//!
//! # Logging
//!
//! The crate emits `tracing` events and never installs a subscriber.

pub mod auth;
pub mod commit;
pub mod core;
pub mod forge;
pub mod stage;
