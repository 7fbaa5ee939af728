use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::user_repository::UserStoreError;

/// Fatal request errors
///
/// Anything that reaches this type is reported as a 500; recoverable login
/// problems are modelled by `LoginFailure` instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("User store error: {0}")]
    UserStore(#[from] UserStoreError),

    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("Pre-login hook '{hook}' failed: {source}")]
    PreLoginHook {
        hook: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}
