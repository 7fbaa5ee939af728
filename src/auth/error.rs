// Authentication Error Types
// Error handling for the OAuth2 client adapter and SSO configuration

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    // OAuth2-related errors
    #[error("OAuth2 error: {0}")]
    OAuth2Error(String),

    #[error("OAuth2 code exchange failed: {0}")]
    CodeExchangeFailed(String),

    #[error("Failed to retrieve user info: {0}")]
    UserInfoFailed(String),

    #[error("Provider did not return an email address")]
    MissingEmail,

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("Unknown pre-login hook: {0}")]
    UnknownHook(String),

    // Network/HTTP errors
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("Provider communication timeout")]
    Timeout,
}

// Conversion from reqwest errors
impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::Timeout
        } else if err.is_decode() {
            AuthError::JsonError(err.to_string())
        } else {
            AuthError::HttpError(err.to_string())
        }
    }
}
