// Authentication Session Helpers
// Login state kept in the per-browser tower-sessions store

use std::time::Duration;

use tower_sessions::{Expiry, Session};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::user_repository::{LocalUser, UserStore};

/// Expected anti-forgery token of a pending SSO flow
pub const SSO_STATE_KEY: &str = "sso_state";

/// ID of the logged-in user
pub const SESSION_USER_ID_KEY: &str = "_auth_user_id";

/// Authentication backend the user logged in with
pub const SESSION_BACKEND_KEY: &str = "_auth_user_backend";

/// Backend identifier for username/password logins
pub const MODEL_BACKEND: &str = "model";

/// Establish an authenticated session for `user`
///
/// The session id is cycled first so a pre-login session id can't be reused
/// to ride the authenticated session.
pub async fn login(
    session: &Session,
    users: &dyn UserStore,
    user: &LocalUser,
    backend: &str,
) -> Result<(), AppError> {
    let previous: Option<Uuid> = session.get(SESSION_USER_ID_KEY).await?;
    if previous.is_some_and(|id| id != user.id) {
        // A different user was logged in on this browser; start clean
        session.flush().await?;
    } else {
        session.cycle_id().await?;
    }

    session.insert(SESSION_USER_ID_KEY, user.id).await?;
    session.insert(SESSION_BACKEND_KEY, backend).await?;
    users.record_login(user.id).await?;

    info!("User {} logged in via {}", user.id, backend);
    Ok(())
}

/// Expire the session after `age` of inactivity
pub fn set_expiry(session: &Session, age: Duration) {
    let seconds = i64::try_from(age.as_secs()).unwrap_or(i64::MAX);
    session.set_expiry(Some(Expiry::OnInactivity(time::Duration::seconds(seconds))));
}

/// Drop every key of the session, authentication included
pub async fn logout(session: &Session) -> Result<(), AppError> {
    if let Some(user_id) = current_user_id(session).await? {
        info!("User {} logged out", user_id);
    } else {
        debug!("Logout requested without an authenticated session");
    }
    session.flush().await?;
    Ok(())
}

/// ID of the logged-in user, if any
pub async fn current_user_id(session: &Session) -> Result<Option<Uuid>, AppError> {
    Ok(session.get(SESSION_USER_ID_KEY).await?)
}

/// The logged-in user, if the session points at an existing active user
pub async fn current_user(
    session: &Session,
    users: &dyn UserStore,
) -> Result<Option<LocalUser>, AppError> {
    let Some(user_id) = current_user_id(session).await? else {
        return Ok(None);
    };

    Ok(users.get(user_id).await?.filter(|user| user.is_active))
}
