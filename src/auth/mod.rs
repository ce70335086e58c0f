//! auth
//!
//! Credential selection for the remote object API.
//!
//! # Design
//!
//! A client carries exactly one [`Credential`], chosen once when the client is
//! built. Nothing probes for optional fields at request time; the forge
//! matches on the variant and attaches it to every request.
//!
//! # Security
//!
//! Secrets never appear in `Debug` output or error messages. Credential
//! storage is the host application's concern; this module only models the
//! value handed to the client.
//!
//! # Example
//!
//! ```
//! use treepush::auth::Credential;
//!
//! // Basic auth wins when both are supplied.
//! let cred = Credential::select(
//!     Some(("octocat".to_string(), "hunter2".to_string())),
//!     Some("ghp_token".to_string()),
//! );
//! assert_eq!(cred.mode(), "basic");
//! assert!(!format!("{:?}", cred).contains("hunter2"));
//! ```

use serde::{Deserialize, Serialize};

/// The credential attached to every request a client makes.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credential {
    /// Anonymous access. Reads of public repositories only.
    #[default]
    None,
    /// HTTP basic authentication.
    Basic { username: String, secret: String },
    /// Personal access token or app token.
    Token(String),
}

impl Credential {
    /// Choose a credential from optionally supplied parts.
    ///
    /// Basic authentication takes precedence over a token when both are
    /// present. Empty tokens and basic pairs with an empty username are
    /// treated as absent.
    pub fn select(basic: Option<(String, String)>, token: Option<String>) -> Self {
        match (basic, token) {
            (Some((username, secret)), _) if !username.is_empty() => {
                Credential::Basic { username, secret }
            }
            (_, Some(token)) if !token.is_empty() => Credential::Token(token),
            _ => Credential::None,
        }
    }

    /// Short name of the active mode, safe to log.
    pub fn mode(&self) -> &'static str {
        match self {
            Credential::None => "none",
            Credential::Basic { .. } => "basic",
            Credential::Token(_) => "token",
        }
    }

    /// Whether any credential will be sent.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Credential::None)
    }
}

// Custom Debug to avoid exposing secrets
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::None => f.write_str("Credential::None"),
            Credential::Basic { username, .. } => f
                .debug_struct("Credential::Basic")
                .field("username", username)
                .field("secret", &"<redacted>")
                .finish(),
            Credential::Token(_) => f.write_str("Credential::Token(<redacted>)"),
        }
    }
}

/// Where a [`Credential::Token`] is attached to a request.
///
/// `Header` sends `Authorization: Bearer <token>`. `Query` appends
/// `access_token=<token>` to the URL, which only legacy and self-hosted
/// deployments still accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPlacement {
    #[default]
    Header,
    Query,
}
