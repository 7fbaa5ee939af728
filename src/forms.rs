//! Signup and password-login forms.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::auth::password::{hash_password, verify_password};
use crate::error::{AppError, AppResult};
use crate::user_repository::{LocalUser, NewUser, UserStore};

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const PASSWORD_MIN_LENGTH: usize = 8;

const REQUIRED: &str = "This field is required.";

fn username_regex() -> &'static Regex {
    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    USERNAME_REGEX.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("Valid username regex"))
}

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("Valid email regex")
    })
}

/// Field name to error messages, in field order
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages for one field
    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Account registration form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

impl SignupForm {
    /// Check every field; an empty result means the form can be saved
    pub async fn validate(&self, users: &dyn UserStore) -> AppResult<FormErrors> {
        let mut errors = FormErrors::default();
        let username = self.username.trim();
        let email = self.email.trim();

        if username.is_empty() {
            errors.add("username", REQUIRED);
        } else if username.chars().count() > USERNAME_MAX_LENGTH {
            errors.add(
                "username",
                format!("Ensure this value has at most {USERNAME_MAX_LENGTH} characters."),
            );
        } else if !username_regex().is_match(username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        } else if users.find_by_username(username).await?.is_some() {
            errors.add("username", "A user with that username already exists.");
        }

        if email.is_empty() {
            errors.add("email", REQUIRED);
        } else if !email_regex().is_match(email) {
            errors.add("email", "Enter a valid email address.");
        } else if users.find_by_email(email).await?.is_some() {
            errors.add("email", "A user with that email already exists.");
        }

        if self.password1.is_empty() {
            errors.add("password1", REQUIRED);
        }
        if self.password2.is_empty() {
            errors.add("password2", REQUIRED);
        } else if !self.password1.is_empty() {
            if self.password1 != self.password2 {
                errors.add("password2", "The two password fields didn't match.");
            } else {
                self.check_password_strength(username, &mut errors);
            }
        }

        if !errors.is_empty() {
            debug!("Signup form rejected: {:?}", errors);
        }
        Ok(errors)
    }

    fn check_password_strength(&self, username: &str, errors: &mut FormErrors) {
        let password = &self.password2;

        if password.chars().count() < PASSWORD_MIN_LENGTH {
            errors.add(
                "password2",
                format!(
                    "This password is too short. It must contain at least {PASSWORD_MIN_LENGTH} characters."
                ),
            );
        }
        if password.chars().all(|c| c.is_ascii_digit()) {
            errors.add("password2", "This password is entirely numeric.");
        }
        if !username.is_empty() && password.eq_ignore_ascii_case(username) {
            errors.add("password2", "The password is too similar to the username.");
        }
    }

    /// Persist the account; call only after `validate` came back empty
    pub async fn save(&self, users: &dyn UserStore) -> AppResult<LocalUser> {
        let password_hash = hash_password(&self.password1)
            .map_err(|e| AppError::internal(format!("Password hashing failed: {e}")))?;

        let user = users
            .create(NewUser {
                username: self.username.trim().to_string(),
                email: self.email.trim().to_string(),
                password_hash: Some(password_hash),
                ..Default::default()
            })
            .await?;

        info!("Registered user {}", user.id);
        Ok(user)
    }
}

/// Username and password login form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub const INVALID_LOGIN: &'static str = "Please enter a correct username and password.";

    /// The active user these credentials belong to, if any
    ///
    /// Users without a password (SSO-only accounts) never authenticate here.
    pub async fn authenticate(&self, users: &dyn UserStore) -> AppResult<Option<LocalUser>> {
        let username = self.username.trim();
        if username.is_empty() || self.password.is_empty() {
            return Ok(None);
        }

        let Some(user) = users.find_by_username(username).await? else {
            debug!("Password login for unknown username");
            return Ok(None);
        };

        let verified = user
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(&self.password, hash));

        Ok((verified && user.is_active).then_some(user))
    }
}
