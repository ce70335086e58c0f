//! core::config::schema
//!
//! On-disk configuration schema.
//!
//! # Example
//!
//! ```toml
//! remote = "git@github.com:octocat/hello-world.git"
//! branch = "main"
//! local_root = "."
//! timeout_secs = 30
//! binary_files = "upload"
//!
//! [auth]
//! mode = "token"
//! secret_env = "GITHUB_TOKEN"
//! ```
//!
//! # Secrets
//!
//! Passwords and tokens are never read from the file. `auth.secret_env` names
//! the environment variable that holds them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::auth::TokenPlacement;
use crate::forge::github::parse_github_url;
use crate::stage::BinaryPolicy;

/// Environment variable read for the secret when `auth.secret_env` is unset.
pub const DEFAULT_SECRET_ENV: &str = "GITHUB_TOKEN";

/// Configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Repository owner (user or organization)
    pub owner: Option<String>,

    /// Repository name
    pub repo: Option<String>,

    /// GitHub remote URL, as an alternative to `owner` + `repo`
    pub remote: Option<String>,

    /// Target branch (default: "master")
    pub branch: Option<String>,

    /// Base directory for relative paths
    pub local_root: Option<PathBuf>,

    /// API base URL (for GitHub Enterprise)
    pub api_base: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,

    pub token_placement: Option<TokenPlacement>,

    pub binary_files: Option<BinaryPolicy>,

    pub auth: Option<AuthConfig>,
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub mode: AuthMode,

    /// Username for basic auth
    pub username: Option<String>,

    /// Environment variable holding the password or token
    pub secret_env: Option<String>,
}

/// Which credential variant to build.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    None,
    Basic,
    Token,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.remote, &self.owner, &self.repo) {
            (Some(remote), None, None) => {
                if parse_github_url(remote).is_none() {
                    return Err(ConfigError::InvalidValue(format!(
                        "remote '{}' is not a GitHub repository URL",
                        remote
                    )));
                }
            }
            (None, Some(_), Some(_)) => {}
            (Some(_), _, _) => {
                return Err(ConfigError::InvalidValue(
                    "set either remote or owner/repo, not both".into(),
                ))
            }
            (None, _, _) => {
                return Err(ConfigError::InvalidValue(
                    "owner and repo are required when remote is not set".into(),
                ))
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "timeout_secs must be greater than zero".into(),
            ));
        }

        if let Some(api_base) = &self.api_base {
            if !(api_base.starts_with("https://") || api_base.starts_with("http://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "api_base '{}' must be an http(s) URL",
                    api_base
                )));
            }
        }

        if let Some(auth) = &self.auth {
            auth.validate()?;
        }

        Ok(())
    }

    /// Owner and repository, from `remote` or the explicit fields.
    pub fn owner_and_repo(&self) -> Option<(String, String)> {
        match (&self.remote, &self.owner, &self.repo) {
            (Some(remote), _, _) => parse_github_url(remote),
            (None, Some(owner), Some(repo)) => Some((owner.clone(), repo.clone())),
            _ => None,
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == AuthMode::Basic
            && self.username.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::InvalidValue(
                "auth.username is required for basic auth".into(),
            ));
        }
        if self.secret_env.as_deref() == Some("") {
            return Err(ConfigError::InvalidValue(
                "auth.secret_env cannot be empty".into(),
            ));
        }
        Ok(())
    }

    /// Name of the environment variable holding the secret.
    pub fn secret_env(&self) -> &str {
        self.secret_env.as_deref().unwrap_or(DEFAULT_SECRET_ENV)
    }
}
