//! core::config
//!
//! Client configuration and loading.
//!
//! # Overview
//!
//! [`ClientConfig`] is the immutable value a client is built from: target
//! repository, local root, credential and transport settings. It can be
//! built in code or loaded from a TOML file.
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. An explicit path passed to [`ClientConfig::load`]
//! 2. `$TREEPUSH_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/treepush/config.toml`
//! 4. `~/.treepush/config.toml`
//!
//! A relative `local_root` in a file is resolved against the file's
//! directory.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use treepush::auth::Credential;
//! use treepush::core::config::ClientConfig;
//! use treepush::core::types::RepoCoordinates;
//!
//! let coords = RepoCoordinates::parse("octocat", "hello-world", "main").unwrap();
//! let config = ClientConfig::new(coords, "/tmp/checkout")
//!     .with_credential(Credential::Token("ghp_xxx".into()))
//!     .with_timeout(Duration::from_secs(10));
//! assert_eq!(config.timeout(), Duration::from_secs(10));
//! ```

pub mod schema;

pub use schema::{AuthConfig, AuthMode, FileConfig};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::auth::{Credential, TokenPlacement};
use crate::core::types::{RepoCoordinates, TypeError};
use crate::forge::github::DEFAULT_API_BASE;
use crate::stage::{BinaryPolicy, TreeItemBuilder};

/// Per-request timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("no config file found")]
    NotFound,

    #[error("environment variable '{var}' holding the credential secret is not set")]
    MissingSecret { var: String },
}

impl From<TypeError> for ConfigError {
    fn from(e: TypeError) -> Self {
        ConfigError::InvalidValue(e.to_string())
    }
}

/// Immutable client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    coordinates: RepoCoordinates,
    local_root: PathBuf,
    credential: Credential,
    api_base: String,
    timeout: Duration,
    token_placement: TokenPlacement,
    binary_files: BinaryPolicy,
}

impl ClientConfig {
    /// Configuration with anonymous access and default transport settings.
    pub fn new(coordinates: RepoCoordinates, local_root: impl Into<PathBuf>) -> Self {
        Self {
            coordinates,
            local_root: local_root.into(),
            credential: Credential::None,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            token_placement: TokenPlacement::default(),
            binary_files: BinaryPolicy::default(),
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_token_placement(mut self, placement: TokenPlacement) -> Self {
        self.token_placement = placement;
        self
    }

    pub fn with_binary_policy(mut self, policy: BinaryPolicy) -> Self {
        self.binary_files = policy;
        self
    }

    pub fn coordinates(&self) -> &RepoCoordinates {
        &self.coordinates
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn token_placement(&self) -> TokenPlacement {
        self.token_placement
    }

    pub fn binary_policy(&self) -> BinaryPolicy {
        self.binary_files
    }

    /// A tree item builder rooted at `local_root`.
    pub fn tree_builder(&self) -> TreeItemBuilder {
        TreeItemBuilder::new(&self.local_root).with_binary_policy(self.binary_files)
    }

    /// Load configuration from the first file found.
    ///
    /// Secrets are read from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no file exists, or the parse,
    /// validation or secret error of the file that was found.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::find_config_file(explicit).ok_or(ConfigError::NotFound)?;
        let contents = fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;
        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");

        let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_file_config(file, Some(config_dir), |var| std::env::var(var).ok())
    }

    /// Build configuration from parsed file contents.
    ///
    /// `env` looks up the secret environment variable; tests pass a closure
    /// instead of touching the process environment.
    pub fn from_file_config(
        file: FileConfig,
        base_dir: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        file.validate()?;

        let (owner, repo) = file
            .owner_and_repo()
            .ok_or_else(|| ConfigError::InvalidValue("repository not configured".into()))?;
        let branch = file
            .branch
            .clone()
            .unwrap_or_else(|| crate::core::types::BranchName::DEFAULT.to_string());
        let coordinates = RepoCoordinates::parse(owner, repo, branch)?;

        let local_root = match (file.local_root.clone(), base_dir) {
            (Some(root), Some(dir)) if root.is_relative() => dir.join(root),
            (Some(root), _) => root,
            (None, Some(dir)) => dir.to_path_buf(),
            (None, None) => PathBuf::from("."),
        };

        let credential = match &file.auth {
            None => Credential::None,
            Some(auth) => {
                let secret = || {
                    env(auth.secret_env()).ok_or_else(|| ConfigError::MissingSecret {
                        var: auth.secret_env().to_string(),
                    })
                };
                match auth.mode {
                    AuthMode::None => Credential::None,
                    AuthMode::Basic => Credential::Basic {
                        username: auth.username.clone().unwrap_or_default(),
                        secret: secret()?,
                    },
                    AuthMode::Token => Credential::Token(secret()?),
                }
            }
        };

        let mut config = ClientConfig::new(coordinates, local_root).with_credential(credential);
        if let Some(api_base) = file.api_base {
            config = config.with_api_base(api_base);
        }
        if let Some(secs) = file.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(placement) = file.token_placement {
            config = config.with_token_placement(placement);
        }
        if let Some(policy) = file.binary_files {
            config = config.with_binary_policy(policy);
        }
        Ok(config)
    }

    fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var("TREEPUSH_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("treepush/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".treepush/config.toml"))
            .filter(|path| path.exists())
    }
}
