/// SSO Login Controller
///
/// Runs the callback half of the Google login: a fixed sequence of gates
/// (feature flag, code, anti-forgery state, token exchange, userinfo, email
/// policy, user resolution), then the pre-login hook and session
/// establishment. Recoverable failures come back as `LoginFailure`; hook and
/// storage failures are fatal `AppError`s.
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tower_sessions::Session;
use tracing::{debug, info, warn};

use crate::auth::config::SsoConfig;
use crate::auth::error::AuthError;
use crate::auth::hooks::{HookRegistry, PreLoginHook, RequestContext};
use crate::auth::providers::SsoClient;
use crate::auth::session::{self, SSO_STATE_KEY};
use crate::auth::user_helper::UserHelper;
use crate::error::{AppError, AppResult};
use crate::user_repository::{LocalUser, UserStore};

/// OAuth2 callback parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code from provider
    pub code: Option<String>,

    /// CSRF state token
    pub state: Option<String>,

    /// Error from provider
    pub error: Option<String>,

    /// Error description from provider
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Whether the request came back from the identity provider
    pub fn is_callback(&self) -> bool {
        self.code.is_some() || self.state.is_some() || self.error.is_some()
    }
}

/// Why an SSO login was turned down
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginFailure {
    #[error("Google SSO not enabled.")]
    FeatureDisabled,

    #[error("Authorization Code not received from SSO.")]
    MissingCode,

    #[error("State Mismatch. Time expired?")]
    StateMismatch,

    #[error("{0}")]
    TokenExchangeFailed(String),

    #[error("Unable to read your profile from SSO: {0}")]
    UserInfoUnavailable(String),

    #[error("Email address not allowed: {0}. Please contact your administrator.")]
    EmailNotAllowed(String),

    #[error("User not found or inactive")]
    UserUnavailable,
}

impl LoginFailure {
    /// Flash message shown to the user
    ///
    /// `UserUnavailable` stays silent so the page does not reveal which
    /// emails have accounts.
    pub fn message(&self) -> Option<String> {
        match self {
            LoginFailure::UserUnavailable => None,
            other => Some(other.to_string()),
        }
    }
}

/// Result of an SSO callback
#[derive(Debug)]
pub enum LoginOutcome {
    LoggedIn(LocalUser),
    Rejected(LoginFailure),
}

/// Result of starting an SSO flow
#[derive(Debug)]
pub enum LoginStart {
    /// Send the browser to the provider
    Redirect(String),
    Rejected(LoginFailure),
}

/// Compare the callback state with the one stored when the flow started
fn state_matches(expected: Option<&str>, received: Option<&str>) -> bool {
    match (expected, received) {
        (Some(expected), Some(received)) if !expected.is_empty() => {
            expected.as_bytes().ct_eq(received.as_bytes()).into()
        }
        _ => false,
    }
}

pub struct LoginController {
    config: SsoConfig,
    client: Arc<dyn SsoClient>,
    users: Arc<dyn UserStore>,
    hook_name: String,
    hook: Arc<dyn PreLoginHook>,
}

impl LoginController {
    pub fn new(
        config: SsoConfig,
        client: Arc<dyn SsoClient>,
        users: Arc<dyn UserStore>,
        hook_name: impl Into<String>,
        hook: Arc<dyn PreLoginHook>,
    ) -> Self {
        Self {
            config,
            client,
            users,
            hook_name: hook_name.into(),
            hook,
        }
    }

    /// Build a controller whose hook is the one named by `sso.pre_login_callback`
    pub fn from_registry(
        config: SsoConfig,
        client: Arc<dyn SsoClient>,
        users: Arc<dyn UserStore>,
        hooks: &HookRegistry,
    ) -> Result<Self, AuthError> {
        let hook_name = config.pre_login_callback.clone();
        let hook = hooks.resolve(&hook_name)?;
        Ok(Self::new(config, client, users, hook_name, hook))
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Begin an SSO flow, remembering its state token in the session
    pub async fn start_login(&self, session: &Session) -> AppResult<LoginStart> {
        if !self.config.enabled {
            return Ok(LoginStart::Rejected(LoginFailure::FeatureDisabled));
        }

        let request = self.client.start_flow()?;
        session.insert(SSO_STATE_KEY, &request.state).await?;
        debug!("Started SSO flow");

        Ok(LoginStart::Redirect(request.url))
    }

    /// Complete an SSO login from the provider's callback
    pub async fn complete_login(
        &self,
        session: &Session,
        params: &CallbackParams,
        request: &RequestContext,
    ) -> AppResult<LoginOutcome> {
        match self.run_gates(session, params).await? {
            Ok(user) => {
                self.hook
                    .before_login(&user, request)
                    .await
                    .map_err(|source| AppError::PreLoginHook {
                        hook: self.hook_name.clone(),
                        source,
                    })?;

                session::login(
                    session,
                    self.users.as_ref(),
                    &user,
                    &self.config.authentication_backend,
                )
                .await?;
                session::set_expiry(session, self.config.session_duration());

                info!("SSO login completed for user {}", user.id);
                Ok(LoginOutcome::LoggedIn(user))
            }
            Err(failure) => {
                warn!("SSO login rejected: {:?}", failure);
                Ok(LoginOutcome::Rejected(failure))
            }
        }
    }

    /// Every check up to and including user resolution
    async fn run_gates(
        &self,
        session: &Session,
        params: &CallbackParams,
    ) -> AppResult<Result<LocalUser, LoginFailure>> {
        if !self.config.enabled {
            return Ok(Err(LoginFailure::FeatureDisabled));
        }

        let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
            if let Some(error) = &params.error {
                debug!(
                    "Provider returned error {}: {}",
                    error,
                    params.error_description.as_deref().unwrap_or("")
                );
            }
            return Ok(Err(LoginFailure::MissingCode));
        };

        let expected: Option<String> = session.get(SSO_STATE_KEY).await?;
        if !state_matches(expected.as_deref(), params.state.as_deref()) {
            return Ok(Err(LoginFailure::StateMismatch));
        }
        // A state token is good for one callback
        session.remove::<String>(SSO_STATE_KEY).await?;

        let token = match self.client.fetch_token(code).await {
            Ok(token) => token,
            Err(e) => return Ok(Err(LoginFailure::TokenExchangeFailed(e.to_string()))),
        };

        let info = match self.client.get_user_info(&token).await {
            Ok(info) => info,
            Err(e) => return Ok(Err(LoginFailure::UserInfoUnavailable(e.to_string()))),
        };

        let helper = UserHelper::new(info, &self.config, self.users.as_ref());
        if !helper.email_is_valid() {
            return Ok(Err(LoginFailure::EmailNotAllowed(
                helper.user_email().to_string(),
            )));
        }

        let user = if self.config.auto_create_users {
            helper.get_or_create_user().await?
        } else {
            helper.find_user().await?
        };

        match user {
            Some(user) if user.is_active => Ok(Ok(user)),
            _ => Ok(Err(LoginFailure::UserUnavailable)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hooks::NoopHook;
    use crate::auth::providers::{
        AuthorizationRequest, MockSsoClient, ProviderToken, ProviderUserInfo,
    };
    use crate::auth::session::{SESSION_BACKEND_KEY, current_user_id};
    use crate::user_repository::{MemoryUserStore, NewUser};
    use async_trait::async_trait;
    use tower_sessions::{Expiry, MemoryStore};

    const STATE: &str = "expected-state";

    struct FailingHook;

    #[async_trait]
    impl PreLoginHook for FailingHook {
        async fn before_login(
            &self,
            _user: &LocalUser,
            _request: &RequestContext,
        ) -> anyhow::Result<()> {
            anyhow::bail!("directory sync unavailable")
        }
    }

    fn enabled_config() -> SsoConfig {
        SsoConfig {
            enabled: true,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            allowable_domains: vec!["example.com".to_string()],
            auto_create_users: false,
            session_cookie_age: 1800,
            ..Default::default()
        }
    }

    fn token() -> ProviderToken {
        ProviderToken {
            access_token: "access".to_string(),
            token_type: "bearer".to_string(),
            expires_in: Some(3599),
            refresh_token: None,
            scopes: vec![],
        }
    }

    fn identity(email: &str) -> ProviderUserInfo {
        ProviderUserInfo {
            subject: "google-123".to_string(),
            email: email.to_string(),
            email_verified: true,
            name: None,
            given_name: Some("Jane".to_string()),
            family_name: Some("Doe".to_string()),
            picture: None,
            locale: None,
            hosted_domain: None,
        }
    }

    /// Mock that must not be reached past the early gates
    fn untouched_client() -> MockSsoClient {
        let mut client = MockSsoClient::new();
        client.expect_fetch_token().never();
        client.expect_get_user_info().never();
        client
    }

    /// Mock that completes the exchange for `email`
    fn client_for(email: &str) -> MockSsoClient {
        let info = identity(email);
        let mut client = MockSsoClient::new();
        client
            .expect_fetch_token()
            .times(1)
            .returning(|_| Ok(token()));
        client
            .expect_get_user_info()
            .times(1)
            .returning(move |_| Ok(info.clone()));
        client
    }

    fn controller(
        config: SsoConfig,
        client: MockSsoClient,
        users: Arc<MemoryUserStore>,
    ) -> LoginController {
        LoginController::new(config, Arc::new(client), users, "noop", Arc::new(NoopHook))
    }

    async fn session_with_state() -> Session {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        session.insert(SSO_STATE_KEY, STATE).await.unwrap();
        session
    }

    fn callback(code: Option<&str>, state: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(str::to_string),
            state: state.map(str::to_string),
            ..Default::default()
        }
    }

    async fn existing_user(users: &MemoryUserStore, email: &str, active: bool) -> LocalUser {
        let mut user = users
            .create(NewUser {
                username: email.to_string(),
                email: email.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        if !active {
            user.is_active = false;
            users.update(&user).await.unwrap();
        }
        user
    }

    fn rejected(outcome: LoginOutcome) -> LoginFailure {
        match outcome {
            LoginOutcome::Rejected(failure) => failure,
            LoginOutcome::LoggedIn(user) => panic!("unexpected login of {}", user.email),
        }
    }

    #[test]
    fn test_state_matches() {
        assert!(state_matches(Some("abc"), Some("abc")));
        assert!(!state_matches(Some("abc"), Some("abd")));
        assert!(!state_matches(Some("abc"), Some("abcd")));
        assert!(!state_matches(None, Some("abc")));
        assert!(!state_matches(Some("abc"), None));
        assert!(!state_matches(Some(""), Some("")));
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            LoginFailure::FeatureDisabled.message().as_deref(),
            Some("Google SSO not enabled.")
        );
        assert_eq!(
            LoginFailure::TokenExchangeFailed("invalid_grant".to_string()).message(),
            Some("invalid_grant".to_string())
        );
        assert_eq!(
            LoginFailure::EmailNotAllowed("eve@evil.org".to_string())
                .message()
                .as_deref(),
            Some("Email address not allowed: eve@evil.org. Please contact your administrator.")
        );
        assert_eq!(LoginFailure::UserUnavailable.message(), None);
    }

    #[test]
    fn test_callback_detection() {
        assert!(!CallbackParams::default().is_callback());
        assert!(callback(Some("code"), None).is_callback());
        assert!(callback(None, Some(STATE)).is_callback());
    }

    #[tokio::test]
    async fn test_disabled_sso_stops_immediately() {
        let config = SsoConfig {
            enabled: false,
            ..enabled_config()
        };
        let users = Arc::new(MemoryUserStore::new());
        let controller = controller(config, untouched_client(), users);
        let session = session_with_state().await;

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), Some(STATE)), &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(rejected(outcome), LoginFailure::FeatureDisabled);
        assert!(current_user_id(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_code() {
        let users = Arc::new(MemoryUserStore::new());
        let controller = controller(enabled_config(), untouched_client(), users);
        let session = session_with_state().await;

        for params in [callback(None, Some(STATE)), callback(Some(""), Some(STATE))] {
            let outcome = controller
                .complete_login(&session, &params, &RequestContext::default())
                .await
                .unwrap();
            assert_eq!(rejected(outcome), LoginFailure::MissingCode);
        }
    }

    #[tokio::test]
    async fn test_state_mismatch() {
        let users = Arc::new(MemoryUserStore::new());
        let controller = controller(enabled_config(), untouched_client(), users);
        let session = session_with_state().await;

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), Some("forged")), &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(rejected(outcome), LoginFailure::StateMismatch);

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), None), &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(rejected(outcome), LoginFailure::StateMismatch);

        // The pending flow survives a forged callback
        let stored: Option<String> = session.get(SSO_STATE_KEY).await.unwrap();
        assert_eq!(stored.as_deref(), Some(STATE));
    }

    #[tokio::test]
    async fn test_missing_session_state() {
        let users = Arc::new(MemoryUserStore::new());
        let controller = controller(enabled_config(), untouched_client(), users);
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), Some(STATE)), &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(rejected(outcome), LoginFailure::StateMismatch);
    }

    #[tokio::test]
    async fn test_token_exchange_failure() {
        let users = Arc::new(MemoryUserStore::new());
        let mut client = MockSsoClient::new();
        client
            .expect_fetch_token()
            .times(1)
            .returning(|_| Err(AuthError::CodeExchangeFailed("invalid_grant: Bad Request".to_string())));
        client.expect_get_user_info().never();
        let controller = controller(enabled_config(), client, users);
        let session = session_with_state().await;

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), Some(STATE)), &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(
            rejected(outcome),
            LoginFailure::TokenExchangeFailed(
                "OAuth2 code exchange failed: invalid_grant: Bad Request".to_string()
            )
        );
        assert!(current_user_id(&session).await.unwrap().is_none());
        // The state was spent on this callback
        let stored: Option<String> = session.get(SSO_STATE_KEY).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_user_info_failure() {
        let users = Arc::new(MemoryUserStore::new());
        let mut client = MockSsoClient::new();
        client
            .expect_fetch_token()
            .times(1)
            .returning(|_| Ok(token()));
        client
            .expect_get_user_info()
            .times(1)
            .returning(|_| Err(AuthError::MissingEmail));
        let controller = controller(enabled_config(), client, users);
        let session = session_with_state().await;

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), Some(STATE)), &RequestContext::default())
            .await
            .unwrap();

        assert!(matches!(
            rejected(outcome),
            LoginFailure::UserInfoUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_email_not_allowed() {
        let users = Arc::new(MemoryUserStore::new());
        let config = SsoConfig {
            auto_create_users: true,
            ..enabled_config()
        };
        let controller = controller(config, client_for("eve@evil.org"), users.clone());
        let session = session_with_state().await;

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), Some(STATE)), &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(
            rejected(outcome),
            LoginFailure::EmailNotAllowed("eve@evil.org".to_string())
        );
        assert!(users.is_empty().await);
        assert!(current_user_id(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_user_without_auto_create() {
        let users = Arc::new(MemoryUserStore::new());
        let controller = controller(enabled_config(), client_for("jane@example.com"), users.clone());
        let session = session_with_state().await;

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), Some(STATE)), &RequestContext::default())
            .await
            .unwrap();

        let failure = rejected(outcome);
        assert_eq!(failure, LoginFailure::UserUnavailable);
        assert!(failure.message().is_none());
        assert!(users.is_empty().await);
    }

    #[tokio::test]
    async fn test_inactive_user_is_rejected() {
        let users = Arc::new(MemoryUserStore::new());
        existing_user(&users, "jane@example.com", false).await;
        let controller = controller(enabled_config(), client_for("jane@example.com"), users);
        let session = session_with_state().await;

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), Some(STATE)), &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(rejected(outcome), LoginFailure::UserUnavailable);
        assert!(current_user_id(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auto_create_user() {
        let users = Arc::new(MemoryUserStore::new());
        let config = SsoConfig {
            auto_create_users: true,
            ..enabled_config()
        };
        let controller = controller(config, client_for("jane@example.com"), users.clone());
        let session = session_with_state().await;

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), Some(STATE)), &RequestContext::default())
            .await
            .unwrap();

        let LoginOutcome::LoggedIn(user) = outcome else {
            panic!("expected a login");
        };
        assert_eq!(user.email, "jane@example.com");
        assert_eq!(users.len().await, 1);
        assert_eq!(current_user_id(&session).await.unwrap(), Some(user.id));
    }

    #[tokio::test]
    async fn test_existing_user_logs_in() {
        let users = Arc::new(MemoryUserStore::new());
        let existing = existing_user(&users, "jane@example.com", true).await;
        let controller = controller(enabled_config(), client_for("jane@example.com"), users.clone());
        let session = session_with_state().await;

        let outcome = controller
            .complete_login(&session, &callback(Some("code"), Some(STATE)), &RequestContext::default())
            .await
            .unwrap();

        let LoginOutcome::LoggedIn(user) = outcome else {
            panic!("expected a login");
        };
        assert_eq!(user.id, existing.id);
        assert_eq!(current_user_id(&session).await.unwrap(), Some(existing.id));
        let backend: Option<String> = session.get(SESSION_BACKEND_KEY).await.unwrap();
        assert_eq!(backend.as_deref(), Some("sitegate.sso"));
        assert_eq!(
            session.expiry(),
            Some(Expiry::OnInactivity(time::Duration::seconds(1800)))
        );
        assert!(users.get(existing.id).await.unwrap().unwrap().last_login.is_some());
        assert_eq!(users.len().await, 1);
    }

    #[tokio::test]
    async fn test_hook_failure_is_fatal() {
        let users = Arc::new(MemoryUserStore::new());
        existing_user(&users, "jane@example.com", true).await;
        let controller = LoginController::new(
            enabled_config(),
            Arc::new(client_for("jane@example.com")),
            users,
            "sync_directory",
            Arc::new(FailingHook),
        );
        let session = session_with_state().await;

        let result = controller
            .complete_login(&session, &callback(Some("code"), Some(STATE)), &RequestContext::default())
            .await;

        assert!(matches!(
            result,
            Err(AppError::PreLoginHook { ref hook, .. }) if hook == "sync_directory"
        ));
        assert!(current_user_id(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_from_registry_rejects_unknown_hook() {
        let config = SsoConfig {
            pre_login_callback: "missing".to_string(),
            ..enabled_config()
        };

        let result = LoginController::from_registry(
            config,
            Arc::new(MockSsoClient::new()),
            Arc::new(MemoryUserStore::new()),
            &HookRegistry::new(),
        );

        assert!(matches!(result, Err(AuthError::UnknownHook(_))));
    }

    #[tokio::test]
    async fn test_start_login_stores_state() {
        let mut client = MockSsoClient::new();
        client.expect_start_flow().times(1).returning(|| {
            Ok(AuthorizationRequest {
                url: "https://accounts.example.com/auth?state=fresh".to_string(),
                state: "fresh".to_string(),
            })
        });
        let controller = controller(enabled_config(), client, Arc::new(MemoryUserStore::new()));
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        let start = controller.start_login(&session).await.unwrap();

        assert!(matches!(start, LoginStart::Redirect(ref url) if url.ends_with("state=fresh")));
        let stored: Option<String> = session.get(SSO_STATE_KEY).await.unwrap();
        assert_eq!(stored.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_start_login_when_disabled() {
        let mut client = MockSsoClient::new();
        client.expect_start_flow().never();
        let config = SsoConfig {
            enabled: false,
            ..enabled_config()
        };
        let controller = controller(config, client, Arc::new(MemoryUserStore::new()));
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        let start = controller.start_login(&session).await.unwrap();

        assert!(matches!(
            start,
            LoginStart::Rejected(LoginFailure::FeatureDisabled)
        ));
    }
}
