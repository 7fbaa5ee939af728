// SSO Configuration
// Google OAuth2 client settings and the login policy applied to provider identities

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::AuthError;

/// Smallest accepted session age after an SSO login (1 minute)
const MIN_SESSION_COOKIE_AGE: u64 = 60;

/// Largest accepted session age after an SSO login (2 weeks)
const MAX_SESSION_COOKIE_AGE: u64 = 60 * 60 * 24 * 14;

/// Google SSO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoConfig {
    /// Enable Google SSO (disabled logins are rejected before anything else happens)
    #[serde(default)]
    pub enabled: bool,

    /// OAuth2 client ID
    #[serde(default)]
    pub client_id: String,

    /// OAuth2 client secret
    #[serde(default)]
    pub client_secret: String,

    /// OAuth2 redirect URI, normally the `/login` view
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// OAuth2 scopes
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Email domains allowed to sign in; `*` allows every domain
    #[serde(default)]
    pub allowable_domains: Vec<String>,

    /// Create a local user on first SSO login instead of requiring an existing one
    #[serde(default = "default_true")]
    pub auto_create_users: bool,

    /// Refresh names and SSO profile of existing users on every login
    #[serde(default)]
    pub always_update_user_data: bool,

    /// Emails granted staff status; `*` grants it to everyone
    #[serde(default)]
    pub staff_list: Vec<String>,

    /// Emails granted superuser status; `*` grants it to everyone
    #[serde(default)]
    pub superuser_list: Vec<String>,

    /// Name of the registered pre-login hook
    #[serde(default = "default_pre_login_callback")]
    pub pre_login_callback: String,

    /// Authentication backend identifier recorded in the session
    #[serde(default = "default_authentication_backend")]
    pub authentication_backend: String,

    /// Session lifetime after an SSO login, in seconds of inactivity
    #[serde(default = "default_session_cookie_age")]
    pub session_cookie_age: u64,
}

impl SsoConfig {
    /// Validate configuration values
    ///
    /// Client credentials are only required while SSO is enabled.
    pub fn validate(&self) -> Result<(), AuthError> {
        if !self.enabled {
            return Ok(());
        }

        if self.client_id.is_empty() {
            return Err(AuthError::MissingConfig("sso.client_id".to_string()));
        }

        if self.client_secret.is_empty() {
            return Err(AuthError::MissingConfig("sso.client_secret".to_string()));
        }

        // Validate redirect URI format
        if !self.redirect_uri.starts_with("http://") && !self.redirect_uri.starts_with("https://") {
            return Err(AuthError::InvalidConfig {
                key: "sso.redirect_uri".to_string(),
                reason: "must start with http:// or https://".to_string(),
            });
        }

        url::Url::parse(&self.redirect_uri).map_err(|e| AuthError::InvalidConfig {
            key: "sso.redirect_uri".to_string(),
            reason: e.to_string(),
        })?;

        if !(MIN_SESSION_COOKIE_AGE..=MAX_SESSION_COOKIE_AGE).contains(&self.session_cookie_age) {
            return Err(AuthError::InvalidConfig {
                key: "sso.session_cookie_age".to_string(),
                reason: format!(
                    "must be between {} and {} seconds",
                    MIN_SESSION_COOKIE_AGE, MAX_SESSION_COOKIE_AGE
                ),
            });
        }

        if self.authentication_backend.trim().is_empty() {
            return Err(AuthError::InvalidConfig {
                key: "sso.authentication_backend".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get session lifetime as Duration
    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_cookie_age)
    }

    /// Whether `email` is covered by `list`, either by wildcard or case-insensitive match
    pub fn list_contains(list: &[String], email: &str) -> bool {
        list.iter()
            .any(|entry| entry == "*" || entry.eq_ignore_ascii_case(email))
    }
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            allowable_domains: Vec::new(),
            auto_create_users: true,
            always_update_user_data: false,
            staff_list: Vec::new(),
            superuser_list: Vec::new(),
            pre_login_callback: default_pre_login_callback(),
            authentication_backend: default_authentication_backend(),
            session_cookie_age: default_session_cookie_age(),
        }
    }
}

// Default value functions
fn default_redirect_uri() -> String {
    "http://localhost:8000/login".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "email".to_string(),
        "profile".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_pre_login_callback() -> String {
    "noop".to_string()
}

fn default_authentication_backend() -> String {
    "sitegate.sso".to_string()
}

fn default_session_cookie_age() -> u64 {
    3600 // 1 hour
}
