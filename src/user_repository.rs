use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Defines the types of user repository errors that can occur
#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("User not found: {0}")]
    UserNotFound(Uuid),
    #[error("A user with this {field} already exists: {value}")]
    Duplicate { field: &'static str, value: String },
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

/// Provider profile kept for users who signed in through SSO
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SsoProfile {
    /// Provider-specific user ID
    pub subject: String,
    /// URL to the provider profile picture
    pub picture_url: Option<String>,
    /// Locale reported by the provider
    pub locale: Option<String>,
}

/// User data stored in the repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    /// Unique internal user ID
    pub id: Uuid,
    /// Login name; SSO-created users get their email
    pub username: String,
    /// User's email address
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Argon2 PHC string; `None` for users who can only sign in through SSO
    pub password_hash: Option<String>,
    /// Inactive users can never log in
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub sso_profile: Option<SsoProfile>,
}

impl LocalUser {
    /// Display name, falling back to the username
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// Data needed to create a user
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub sso_profile: Option<SsoProfile>,
}

impl NewUser {
    fn validate(&self) -> Result<(), UserStoreError> {
        if self.username.trim().is_empty() {
            return Err(UserStoreError::InvalidData(
                "Username cannot be empty".to_string(),
            ));
        }

        if self.email.trim().is_empty() {
            return Err(UserStoreError::InvalidData(
                "Email cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Persistence seam for local users
///
/// Email and username lookups are case-insensitive.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<LocalUser>, UserStoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<LocalUser>, UserStoreError>;

    async fn find_by_username(&self, username: &str)
    -> Result<Option<LocalUser>, UserStoreError>;

    /// Create a user, rejecting duplicate usernames and emails
    async fn create(&self, user: NewUser) -> Result<LocalUser, UserStoreError>;

    /// Replace a stored user
    async fn update(&self, user: &LocalUser) -> Result<(), UserStoreError>;

    /// Stamp `last_login` with the current time
    async fn record_login(&self, id: Uuid) -> Result<(), UserStoreError>;
}

/// In-memory user repository
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, LocalUser>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(&self, id: Uuid) -> Result<Option<LocalUser>, UserStoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<LocalUser>, UserStoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalUser>, UserStoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<LocalUser, UserStoreError> {
        user.validate()?;

        let mut users = self.users.write().await;

        if users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(UserStoreError::Duplicate {
                field: "username",
                value: user.username,
            });
        }

        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(UserStoreError::Duplicate {
                field: "email",
                value: user.email,
            });
        }

        let created = LocalUser {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            is_active: true,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            date_joined: Utc::now(),
            last_login: None,
            sso_profile: user.sso_profile,
        };

        users.insert(created.id, created.clone());
        debug!("Created new user: {}", created.id);

        Ok(created)
    }

    async fn update(&self, user: &LocalUser) -> Result<(), UserStoreError> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&user.id)
            .ok_or(UserStoreError::UserNotFound(user.id))?;
        *stored = user.clone();
        debug!("Updated user: {}", user.id);
        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> Result<(), UserStoreError> {
        let mut users = self.users.write().await;
        let stored = users.get_mut(&id).ok_or(UserStoreError::UserNotFound(id))?;
        stored.last_login = Some(Utc::now());
        Ok(())
    }
}
