/// Google OAuth2 SSO client
///
/// Authorization URLs and the code exchange go through the `oauth2` crate;
/// the identity behind the access token comes from Google's userinfo endpoint.
use super::{AuthorizationRequest, ProviderToken, ProviderUserInfo, SsoClient};
use crate::auth::config::SsoConfig;
use crate::auth::error::AuthError;
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tracing::debug;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Google userinfo response
#[derive(Debug, Deserialize)]
struct GoogleUserInfoResponse {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
    locale: Option<String>,
    hd: Option<String>,
}

impl GoogleUserInfoResponse {
    fn into_user_info(self) -> Result<ProviderUserInfo, AuthError> {
        let email = self
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or(AuthError::MissingEmail)?;

        Ok(ProviderUserInfo {
            subject: self.sub,
            email,
            email_verified: self.email_verified.unwrap_or(false),
            name: self.name,
            given_name: self.given_name,
            family_name: self.family_name,
            picture: self.picture,
            locale: self.locale,
            hosted_domain: self.hd,
        })
    }
}

/// Google SSO client
pub struct GoogleSsoClient {
    client: ConfiguredClient,
    scopes: Vec<String>,
    userinfo_url: String,
    http_client: reqwest::Client,
}

impl GoogleSsoClient {
    /// Create a Google client from the SSO configuration
    pub fn new(config: &SsoConfig) -> Result<Self, AuthError> {
        Self::with_endpoints(config, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GOOGLE_USERINFO_URL)
    }

    /// Create a client talking to custom endpoints (used against local mock servers)
    pub fn with_endpoints(
        config: &SsoConfig,
        auth_url: &str,
        token_url: &str,
        userinfo_url: &str,
    ) -> Result<Self, AuthError> {
        let auth_url = AuthUrl::new(auth_url.to_string())
            .map_err(|e| AuthError::ConfigError(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new(token_url.to_string())
            .map_err(|e| AuthError::ConfigError(format!("Invalid token URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| {
            AuthError::InvalidConfig {
                key: "sso.redirect_uri".to_string(),
                reason: e.to_string(),
            }
        })?;

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);

        // Ensure openid scope is included for OIDC
        let mut scopes = config.scopes.clone();
        if !scopes.iter().any(|s| s == "openid") {
            scopes.push("openid".to_string());
        }

        // Redirects are not followed, per the oauth2 crate's SSRF guidance
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::OAuth2Error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            scopes,
            userinfo_url: userinfo_url.to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl SsoClient for GoogleSsoClient {
    fn name(&self) -> &str {
        "google"
    }

    fn start_flow(&self) -> Result<AuthorizationRequest, AuthError> {
        let (url, state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "online")
            .add_extra_param("prompt", "select_account")
            .url();

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state: state.secret().clone(),
        })
    }

    async fn fetch_token(&self, code: &str) -> Result<ProviderToken, AuthError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => {
                    AuthError::CodeExchangeFailed(response.to_string())
                }
                other => AuthError::CodeExchangeFailed(other.to_string()),
            })?;

        debug!("Exchanged authorization code for a Google access token");

        Ok(ProviderToken {
            access_token: token.access_token().secret().clone(),
            token_type: token.token_type().as_ref().to_string(),
            expires_in: token.expires_in().map(|d| d.as_secs()),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            scopes: token
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default(),
        })
    }

    async fn get_user_info(&self, token: &ProviderToken) -> Result<ProviderUserInfo, AuthError> {
        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::UserInfoFailed(format!(
                "UserInfo request failed with status {}: {}",
                status, error_text
            )));
        }

        let userinfo: GoogleUserInfoResponse = response.json().await?;
        userinfo.into_user_info()
    }
}
