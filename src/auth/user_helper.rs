/// User resolution for SSO logins
///
/// Decides whether a provider identity may sign in and maps it onto a local
/// user, creating one when the deployment allows it.
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::config::SsoConfig;
use crate::auth::providers::ProviderUserInfo;
use crate::user_repository::{LocalUser, NewUser, SsoProfile, UserStore, UserStoreError};

pub struct UserHelper<'a> {
    info: ProviderUserInfo,
    config: &'a SsoConfig,
    users: &'a dyn UserStore,
}

impl<'a> UserHelper<'a> {
    pub fn new(info: ProviderUserInfo, config: &'a SsoConfig, users: &'a dyn UserStore) -> Self {
        Self {
            info,
            config,
            users,
        }
    }

    pub fn user_email(&self) -> &str {
        &self.info.email
    }

    /// Whether the email is verified by the provider and its domain is on the allow-list
    ///
    /// Domains match exactly (case-insensitive); `*` allows any domain.
    pub fn email_is_valid(&self) -> bool {
        if !self.info.email_verified {
            return false;
        }
        let Some((local, domain)) = self.user_email().rsplit_once('@') else {
            return false;
        };
        if local.is_empty() || domain.is_empty() {
            return false;
        }

        self.config
            .allowable_domains
            .iter()
            .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(domain))
    }

    /// Find the user by email, creating it when missing
    pub async fn get_or_create_user(&self) -> Result<Option<LocalUser>, UserStoreError> {
        if let Some(user) = self.find_user().await? {
            return Ok(Some(user));
        }

        let email = self.user_email().to_string();
        let new_user = NewUser {
            username: email.clone(),
            email: email.clone(),
            first_name: self.info.given_name.clone().unwrap_or_default(),
            last_name: self.info.family_name.clone().unwrap_or_default(),
            password_hash: None,
            is_staff: SsoConfig::list_contains(&self.config.staff_list, &email),
            is_superuser: SsoConfig::list_contains(&self.config.superuser_list, &email),
            sso_profile: Some(self.profile()),
        };

        let user = match self.users.create(new_user.clone()).await {
            // The email is already someone's username; keep the email, vary the username
            Err(UserStoreError::Duplicate {
                field: "username", ..
            }) => {
                let suffix = Uuid::new_v4().simple().to_string();
                self.users
                    .create(NewUser {
                        username: format!("{}-{}", email, &suffix[..8]),
                        ..new_user
                    })
                    .await?
            }
            other => other?,
        };

        info!("Created user {} from SSO identity {}", user.id, self.info.subject);
        Ok(Some(user))
    }

    /// Find an existing user by email, never creating one
    pub async fn find_user(&self) -> Result<Option<LocalUser>, UserStoreError> {
        let Some(mut user) = self.users.find_by_email(self.user_email()).await? else {
            debug!("No local user for SSO email");
            return Ok(None);
        };

        if self.apply_provider_data(&mut user) {
            self.users.update(&user).await?;
        }

        Ok(Some(user))
    }

    fn profile(&self) -> SsoProfile {
        SsoProfile {
            subject: self.info.subject.clone(),
            picture_url: self.info.picture.clone(),
            locale: self.info.locale.clone(),
        }
    }

    /// Sync an existing user with the provider identity; returns whether anything changed
    ///
    /// Staff and superuser lists only ever promote.
    fn apply_provider_data(&self, user: &mut LocalUser) -> bool {
        let mut changed = false;

        if !user.is_staff && SsoConfig::list_contains(&self.config.staff_list, &user.email) {
            user.is_staff = true;
            changed = true;
        }

        if !user.is_superuser && SsoConfig::list_contains(&self.config.superuser_list, &user.email)
        {
            user.is_superuser = true;
            changed = true;
        }

        if user.sso_profile.is_none() || self.config.always_update_user_data {
            let profile = self.profile();
            if user.sso_profile.as_ref() != Some(&profile) {
                user.sso_profile = Some(profile);
                changed = true;
            }
        }

        if self.config.always_update_user_data {
            if let Some(given_name) = &self.info.given_name
                && user.first_name != *given_name
            {
                user.first_name = given_name.clone();
                changed = true;
            }
            if let Some(family_name) = &self.info.family_name
                && user.last_name != *family_name
            {
                user.last_name = family_name.clone();
                changed = true;
            }
        }

        changed
    }
}
