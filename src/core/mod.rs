//! core
//!
//! Domain types and client configuration.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ObjectId, BranchName, RepoCoordinates
//! - [`config`] - Client configuration and TOML loading

pub mod config;
pub mod types;
