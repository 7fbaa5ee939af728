//! One-time flash messages carried across a redirect in the session.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::error::AppError;

/// Session key holding queued messages
pub const MESSAGES_KEY: &str = "_messages";

/// Message level, rendered as a CSS class
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

/// Flash message for one-time display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashMessage {
    pub level: Level,
    pub text: String,
}

/// Queue a message for the next rendered page
pub async fn add_message(
    session: &Session,
    level: Level,
    text: impl Into<String>,
) -> Result<(), AppError> {
    let mut queued: Vec<FlashMessage> = session.get(MESSAGES_KEY).await?.unwrap_or_default();
    queued.push(FlashMessage {
        level,
        text: text.into(),
    });
    session.insert(MESSAGES_KEY, queued).await?;
    Ok(())
}

pub async fn error(session: &Session, text: impl Into<String>) -> Result<(), AppError> {
    add_message(session, Level::Error, text).await
}

pub async fn success(session: &Session, text: impl Into<String>) -> Result<(), AppError> {
    add_message(session, Level::Success, text).await
}

/// Remove and return every queued message, oldest first
pub async fn take_messages(session: &Session) -> Result<Vec<FlashMessage>, AppError> {
    Ok(session
        .remove::<Vec<FlashMessage>>(MESSAGES_KEY)
        .await?
        .unwrap_or_default())
}
