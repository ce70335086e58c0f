//! forge::github
//!
//! GitHub implementation of the remote object gateway, over the Git Data
//! REST API (`/repos/{owner}/{repo}/git/...`).
//!
//! # Design
//!
//! `reqwest` is the transport. This module owns JSON serialization of request
//! bodies, parsing of responses, and mapping of status codes onto
//! [`ForgeError`]. The configured timeout applies to every request and a
//! timeout is reported as `ForgeError::Transport`.
//!
//! # Authentication
//!
//! The [`Credential`] chosen at construction is attached to every request:
//! nothing for `None`, HTTP basic auth for `Basic`, and for `Token` either an
//! `Authorization: Bearer` header or an `access_token` query parameter,
//! depending on [`TokenPlacement`].
//!
//! # Rate Limiting
//!
//! Returns `ForgeError::RateLimited` when limits are hit. Nothing is retried.
//!
//! # Example
//!
//! ```ignore
//! use treepush::auth::Credential;
//! use treepush::core::types::RepoCoordinates;
//! use treepush::forge::{github::GitHubForge, GitDataForge};
//!
//! let forge = GitHubForge::new(Credential::Token("ghp_xxx".into()));
//! let coords = RepoCoordinates::parse("octocat", "hello-world", "main")?;
//! let tip = forge.fetch_latest_commit(&coords).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::traits::{
    validate_commit_message, validate_tree_items, ForgeError, GitDataForge, RemoteTreeEntry,
};
use crate::auth::{Credential, TokenPlacement};
use crate::core::config::ClientConfig;
use crate::core::types::{ObjectId, RepoCoordinates};
use crate::stage::TreeItem;

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "treepush";

/// REST API version pinned on every request.
const API_VERSION: &str = "2022-11-28";

/// GitHub gateway.
///
/// Holds only read-only configuration, so one instance can be shared across
/// concurrent commits.
pub struct GitHubForge {
    /// HTTP client for making requests
    client: Client,
    credential: Credential,
    token_placement: TokenPlacement,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

// Custom Debug to avoid exposing credentials
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("auth_mode", &self.credential.mode())
            .field("token_placement", &self.token_placement)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// What a request was looking for, used to pick the right not-found error.
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Branch(&'a str),
    Commit(&'a ObjectId),
    RefUpdate(&'a str),
    Object,
}

impl GitHubForge {
    /// Create a forge against the public GitHub API with default settings.
    pub fn new(credential: Credential) -> Self {
        Self {
            client: Client::new(),
            credential,
            token_placement: TokenPlacement::default(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Create a forge from client configuration.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::Transport` if the HTTP client cannot be built
    /// (e.g., TLS backend initialization failure).
    pub fn from_config(config: &ClientConfig) -> Result<Self, ForgeError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| ForgeError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            credential: config.credential().clone(),
            token_placement: config.token_placement(),
            api_base: config.api_base().to_string(),
        })
    }

    /// Use a custom API base URL (e.g., `https://github.example.com/api/v3`).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_placement(mut self, placement: TokenPlacement) -> Self {
        self.token_placement = placement;
        self
    }

    /// Replace the HTTP client, e.g. to apply a different timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ForgeError> {
        self.client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| ForgeError::Transport(e.to_string()))?;
        Ok(self)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Build URL for a repository endpoint.
    fn repo_url(&self, coords: &RepoCoordinates, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base,
            coords.owner(),
            coords.repo(),
            path
        )
    }

    /// Start a request with the common headers and the credential attached.
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header("X-GitHub-Api-Version", API_VERSION);

        match (&self.credential, self.token_placement) {
            (Credential::None, _) => builder,
            (Credential::Basic { username, secret }, _) => {
                builder.basic_auth(username, Some(secret))
            }
            (Credential::Token(token), TokenPlacement::Header) => builder.bearer_auth(token),
            (Credential::Token(token), TokenPlacement::Query) => {
                builder.query(&[("access_token", token)])
            }
        }
    }

    /// Send a request, mapping transport failures.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ForgeError> {
        builder.send().await.map_err(|e| {
            // The URL may carry a query token.
            let e = e.without_url();
            if e.is_timeout() {
                ForgeError::Transport(format!("request timed out: {}", e))
            } else {
                ForgeError::Transport(e.to_string())
            }
        })
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
        target: Target<'_>,
    ) -> Result<T, ForgeError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::Api {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e.without_url()),
            })
        } else {
            Err(self.error_from_response(response, status, target).await)
        }
    }

    /// Map an error response from the API.
    async fn error_from_response(
        &self,
        response: Response,
        status: StatusCode,
        target: Target<'_>,
    ) -> ForgeError {
        // Extract headers before consuming response body.
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let rate_limit_exhausted = header("X-RateLimit-Remaining").as_deref() == Some("0");
        let required_permissions = header("X-Accepted-GitHub-Permissions");

        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => {
                ForgeError::AuthFailed("Invalid or expired credentials".into())
            }
            StatusCode::FORBIDDEN if rate_limit_exhausted => ForgeError::RateLimited,
            StatusCode::FORBIDDEN => {
                let mut err_msg = format!("Permission denied: {}", message);
                if let Some(perms) = required_permissions.filter(|p| !p.is_empty()) {
                    err_msg.push_str(&format!(" [required: {}]", perms));
                }
                ForgeError::AuthFailed(err_msg)
            }
            StatusCode::NOT_FOUND => match target {
                Target::Branch(branch) | Target::RefUpdate(branch) => {
                    ForgeError::RefNotFound(branch.to_string())
                }
                Target::Commit(sha) => ForgeError::CommitNotFound(sha.to_string()),
                Target::Object => ForgeError::NotFound(message),
            },
            StatusCode::CONFLICT => ForgeError::Conflict(message),
            StatusCode::UNPROCESSABLE_ENTITY => match target {
                Target::RefUpdate(_) if message.to_lowercase().contains("fast forward") => {
                    ForgeError::RefUpdateRejected(message)
                }
                Target::RefUpdate(branch)
                    if message.to_lowercase().contains("reference does not exist") =>
                {
                    ForgeError::RefNotFound(branch.to_string())
                }
                _ => ForgeError::Validation(message),
            },
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::Api {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => ForgeError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl GitDataForge for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn fetch_latest_commit(&self, coords: &RepoCoordinates) -> Result<ObjectId, ForgeError> {
        let branch = coords.branch().as_str();
        let url = self.repo_url(coords, &format!("git/refs/heads/{}", branch));
        tracing::debug!(repo = %coords, "GET git/refs/heads");

        let response = self.send(self.request(Method::GET, &url)).await?;
        let body: RefResponse = self
            .handle_response(response, Target::Branch(branch))
            .await?;

        // The refs endpoint answers a prefix match with an array.
        let wanted = format!("refs/heads/{}", branch);
        match body {
            RefResponse::Single(git_ref) => Ok(git_ref.object.sha),
            RefResponse::Many(refs) => refs
                .into_iter()
                .find(|r| r.ref_name.as_deref() == Some(wanted.as_str()))
                .map(|r| r.object.sha)
                .ok_or_else(|| ForgeError::RefNotFound(branch.to_string())),
        }
    }

    async fn fetch_base_tree(
        &self,
        coords: &RepoCoordinates,
        commit: &ObjectId,
    ) -> Result<ObjectId, ForgeError> {
        let url = self.repo_url(coords, &format!("git/commits/{}", commit));
        tracing::debug!(repo = %coords, commit = %commit.short(7), "GET git/commits");

        let response = self.send(self.request(Method::GET, &url)).await?;
        let body: CommitResponse = self
            .handle_response(response, Target::Commit(commit))
            .await?;
        Ok(body.tree.sha)
    }

    async fn create_tree(
        &self,
        coords: &RepoCoordinates,
        base_tree: Option<&ObjectId>,
        items: &[TreeItem],
    ) -> Result<ObjectId, ForgeError> {
        validate_tree_items(items)?;
        let url = self.repo_url(coords, "git/trees");
        tracing::debug!(repo = %coords, items = items.len(), has_base = base_tree.is_some(), "POST git/trees");

        let body = CreateTreeBody {
            base_tree,
            tree: items,
        };
        let response = self
            .send(self.request(Method::POST, &url).json(&body))
            .await?;
        let created: ShaResponse = self.handle_response(response, Target::Object).await?;
        Ok(created.sha)
    }

    async fn create_commit(
        &self,
        coords: &RepoCoordinates,
        tree: &ObjectId,
        parent: &ObjectId,
        message: &str,
    ) -> Result<ObjectId, ForgeError> {
        validate_commit_message(message)?;
        let url = self.repo_url(coords, "git/commits");
        tracing::debug!(repo = %coords, tree = %tree.short(7), parent = %parent.short(7), "POST git/commits");

        let body = CreateCommitBody {
            message,
            tree,
            parents: [parent],
        };
        let response = self
            .send(self.request(Method::POST, &url).json(&body))
            .await?;
        let created: ShaResponse = self.handle_response(response, Target::Object).await?;
        Ok(created.sha)
    }

    async fn update_ref(
        &self,
        coords: &RepoCoordinates,
        commit: &ObjectId,
        force: bool,
    ) -> Result<(), ForgeError> {
        let branch = coords.branch().as_str();
        let url = self.repo_url(coords, &format!("git/refs/heads/{}", branch));
        tracing::debug!(repo = %coords, commit = %commit.short(7), force, "POST git/refs/heads");

        let body = UpdateRefBody { sha: commit, force };
        let response = self
            .send(self.request(Method::POST, &url).json(&body))
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self
                .error_from_response(response, status, Target::RefUpdate(branch))
                .await)
        }
    }

    async fn create_blob(
        &self,
        coords: &RepoCoordinates,
        content: &[u8],
    ) -> Result<ObjectId, ForgeError> {
        let url = self.repo_url(coords, "git/blobs");
        tracing::debug!(repo = %coords, size = content.len(), "POST git/blobs");

        let body = CreateBlobBody {
            content: base64::engine::general_purpose::STANDARD.encode(content),
            encoding: "base64",
        };
        let response = self
            .send(self.request(Method::POST, &url).json(&body))
            .await?;
        let created: ShaResponse = self.handle_response(response, Target::Object).await?;
        Ok(created.sha)
    }

    async fn fetch_tree(
        &self,
        coords: &RepoCoordinates,
        tree: &ObjectId,
    ) -> Result<Vec<RemoteTreeEntry>, ForgeError> {
        let url = self.repo_url(coords, &format!("git/trees/{}", tree));
        tracing::debug!(repo = %coords, tree = %tree.short(7), "GET git/trees");

        let response = self.send(self.request(Method::GET, &url)).await?;
        let body: TreeResponse = self.handle_response(response, Target::Object).await?;
        Ok(body.tree)
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

/// Request body for creating a tree.
#[derive(Serialize)]
struct CreateTreeBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    base_tree: Option<&'a ObjectId>,
    tree: &'a [TreeItem],
}

/// Request body for creating a commit.
#[derive(Serialize)]
struct CreateCommitBody<'a> {
    message: &'a str,
    tree: &'a ObjectId,
    parents: [&'a ObjectId; 1],
}

/// Request body for moving a branch.
#[derive(Serialize)]
struct UpdateRefBody<'a> {
    sha: &'a ObjectId,
    force: bool,
}

/// Request body for uploading a blob.
#[derive(Serialize)]
struct CreateBlobBody {
    content: String,
    encoding: &'static str,
}

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

/// Any response whose only interesting field is `sha`.
#[derive(Deserialize)]
struct ShaResponse {
    sha: ObjectId,
}

/// A ref, or every ref sharing the requested prefix.
#[derive(Deserialize)]
#[serde(untagged)]
enum RefResponse {
    Single(GitHubRef),
    Many(Vec<GitHubRef>),
}

#[derive(Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref", default)]
    ref_name: Option<String>,
    object: ShaResponse,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<RemoteTreeEntry>,
}

// --------------------------------------------------------------------------
// URL Parsing
// --------------------------------------------------------------------------

/// Parse a GitHub remote URL to extract owner and repo.
///
/// Supports both SSH and HTTPS formats:
/// - `git@github.com:owner/repo.git`
/// - `https://github.com/owner/repo.git`
/// - `https://github.com/owner/repo`
///
/// # Example
///
/// ```
/// use treepush::forge::github::parse_github_url;
///
/// let (owner, repo) = parse_github_url("git@github.com:octocat/hello-world.git").unwrap();
/// assert_eq!(owner, "octocat");
/// assert_eq!(repo, "hello-world");
/// ```
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))?;
    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    let (owner, repo) = rest.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parse_github_url {
        use super::*;

        #[test]
        fn ssh_and_https_forms() {
            let expected = Some(("octocat".to_string(), "hello-world".to_string()));
            for url in [
                "git@github.com:octocat/hello-world.git",
                "git@github.com:octocat/hello-world",
                "ssh://git@github.com/octocat/hello-world.git",
                "https://github.com/octocat/hello-world.git",
                "https://github.com/octocat/hello-world",
                "https://github.com/octocat/hello-world/",
                "http://github.com/octocat/hello-world.git",
            ] {
                assert_eq!(parse_github_url(url), expected, "{url}");
            }
        }

        #[test]
        fn repo_with_dots() {
            assert_eq!(
                parse_github_url("git@github.com:owner/repo.name.git"),
                Some(("owner".to_string(), "repo.name".to_string()))
            );
        }

        #[test]
        fn rejects_other_hosts_and_garbage() {
            assert!(parse_github_url("git@gitlab.com:owner/repo.git").is_none());
            assert!(parse_github_url("https://bitbucket.org/owner/repo").is_none());
            assert!(parse_github_url("not a url").is_none());
            assert!(parse_github_url("https://github.com/").is_none());
            assert!(parse_github_url("https://github.com/owner").is_none());
            assert!(parse_github_url("https://github.com/owner/repo/tree/main").is_none());
        }
    }

    mod github_forge {
        use super::*;

        fn coords() -> RepoCoordinates {
            RepoCoordinates::parse("octocat", "hello-world", "main").unwrap()
        }

        #[test]
        fn repo_url_format() {
            let forge = GitHubForge::new(Credential::None);
            assert_eq!(forge.name(), "github");
            assert_eq!(
                forge.repo_url(&coords(), "git/trees"),
                "https://api.github.com/repos/octocat/hello-world/git/trees"
            );
        }

        #[test]
        fn api_base_trailing_slash_trimmed() {
            let forge = GitHubForge::new(Credential::None)
                .with_api_base("https://github.example.com/api/v3/");
            assert_eq!(forge.api_base(), "https://github.example.com/api/v3");
        }

        #[test]
        fn debug_redacts_credentials() {
            let forge = GitHubForge::new(Credential::Token("secret_token_abc123".into()));
            let debug_output = format!("{:?}", forge);
            assert!(!debug_output.contains("secret_token_abc123"));
            assert!(debug_output.contains("token"));

            let forge = GitHubForge::new(Credential::Basic {
                username: "octocat".into(),
                secret: "p4ssw0rd".into(),
            });
            assert!(!format!("{:?}", forge).contains("p4ssw0rd"));
        }

        #[test]
        fn commit_body_wire_shape() {
            let tree = ObjectId::new("1".repeat(40)).unwrap();
            let parent = ObjectId::new("2".repeat(40)).unwrap();
            let body = CreateCommitBody {
                message: "msg",
                tree: &tree,
                parents: [&parent],
            };
            assert_eq!(
                serde_json::to_value(&body).unwrap(),
                serde_json::json!({
                    "message": "msg",
                    "tree": "1".repeat(40),
                    "parents": ["2".repeat(40)]
                })
            );
        }

        #[test]
        fn tree_body_omits_missing_base() {
            let body = CreateTreeBody {
                base_tree: None,
                tree: &[],
            };
            assert_eq!(
                serde_json::to_value(&body).unwrap(),
                serde_json::json!({ "tree": [] })
            );
        }

        #[test]
        fn ref_response_parses_both_shapes() {
            let sha = "a".repeat(40);
            let single: RefResponse = serde_json::from_value(serde_json::json!({
                "ref": "refs/heads/main",
                "object": { "sha": sha, "type": "commit" }
            }))
            .unwrap();
            assert!(matches!(single, RefResponse::Single(_)));

            let many: RefResponse = serde_json::from_value(serde_json::json!([
                { "ref": "refs/heads/main-old", "object": { "sha": sha } }
            ]))
            .unwrap();
            assert!(matches!(many, RefResponse::Many(ref v) if v.len() == 1));
        }

        #[test]
        fn ref_response_without_ref_name_is_single() {
            let sha = "b".repeat(40);
            let body: RefResponse =
                serde_json::from_value(serde_json::json!({ "object": { "sha": sha } })).unwrap();
            match body {
                RefResponse::Single(git_ref) => {
                    assert_eq!(git_ref.ref_name, None);
                    assert_eq!(git_ref.object.sha.as_str(), sha);
                }
                RefResponse::Many(_) => panic!("expected a single ref"),
            }
        }
    }
}
