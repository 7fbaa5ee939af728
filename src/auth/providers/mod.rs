/// SSO client adapters
///
/// This module defines the `SsoClient` trait the login controller talks to,
/// and the Google implementation backing it in production.
use crate::auth::error::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod google;

pub use google::GoogleSsoClient;

/// Identity returned by the provider after a successful code exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderUserInfo {
    /// Unique user identifier from the provider
    pub subject: String,

    /// User's email address
    pub email: String,

    /// Whether the email has been verified by the provider
    pub email_verified: bool,

    /// User's full name (if available)
    pub name: Option<String>,

    /// User's given/first name (if available)
    pub given_name: Option<String>,

    /// User's family/last name (if available)
    pub family_name: Option<String>,

    /// URL to user's profile picture (if available)
    pub picture: Option<String>,

    /// User's locale/language preference (if available)
    pub locale: Option<String>,

    /// Google Workspace domain (if any)
    pub hosted_domain: Option<String>,
}

/// Tokens obtained by exchanging an authorization code
#[derive(Debug, Clone)]
pub struct ProviderToken {
    /// Access token for the userinfo request
    pub access_token: String,

    /// Token type (usually "Bearer")
    pub token_type: String,

    /// Token expiration time in seconds
    pub expires_in: Option<u64>,

    /// Refresh token, when offline access was granted
    pub refresh_token: Option<String>,

    /// Scopes granted by the user
    pub scopes: Vec<String>,
}

/// Start of an authorization-code flow
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// URL the browser is sent to
    pub url: String,

    /// Anti-forgery token to remember in the session as `sso_state`
    pub state: String,
}

/// OAuth2 authorization-code flow client
///
/// Only the three steps the login views need are exposed: starting the flow,
/// exchanging the returned code, and reading the identity behind the token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SsoClient: Send + Sync {
    /// Provider name (e.g., "google")
    fn name(&self) -> &str;

    /// Build the authorization URL together with a fresh state token
    fn start_flow(&self) -> Result<AuthorizationRequest, AuthError>;

    /// Exchange the authorization code for tokens
    async fn fetch_token(&self, code: &str) -> Result<ProviderToken, AuthError>;

    /// Get user information using the access token
    async fn get_user_info(&self, token: &ProviderToken) -> Result<ProviderUserInfo, AuthError>;
}
