#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use sitegate::auth::providers::{AuthorizationRequest, ProviderToken, ProviderUserInfo};
use sitegate::auth::{AuthError, HookRegistry, SsoClient, SsoConfig};
use sitegate::build_app;
use sitegate::config::AppConfig;
use sitegate::user_repository::MemoryUserStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

/// Stand-in identity provider
///
/// Every started flow gets a fresh `fake-state-N`; the code exchange either
/// fails with `token_error` or yields `identity`.
pub struct FakeSsoClient {
    identity: ProviderUserInfo,
    token_error: Option<String>,
    flows: AtomicUsize,
    exchanges: AtomicUsize,
}

impl FakeSsoClient {
    pub fn returning(email: &str) -> Self {
        Self {
            identity: ProviderUserInfo {
                subject: format!("sub-{email}"),
                email: email.to_string(),
                email_verified: true,
                name: Some("Jane Doe".to_string()),
                given_name: Some("Jane".to_string()),
                family_name: Some("Doe".to_string()),
                picture: None,
                locale: Some("en".to_string()),
                hosted_domain: None,
            },
            token_error: None,
            flows: AtomicUsize::new(0),
            exchanges: AtomicUsize::new(0),
        }
    }

    pub fn failing_exchange(error: &str) -> Self {
        Self {
            token_error: Some(error.to_string()),
            ..Self::returning("jane@example.com")
        }
    }

    /// Identity whose email the provider has not verified
    pub fn unverified(email: &str) -> Self {
        let mut client = Self::returning(email);
        client.identity.email_verified = false;
        client
    }

    /// Number of code exchanges attempted
    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SsoClient for FakeSsoClient {
    fn name(&self) -> &str {
        "fake"
    }

    fn start_flow(&self) -> Result<AuthorizationRequest, AuthError> {
        let n = self.flows.fetch_add(1, Ordering::SeqCst);
        let state = format!("fake-state-{n}");
        Ok(AuthorizationRequest {
            url: format!("https://accounts.example.test/auth?client_id=test&state={state}"),
            state,
        })
    }

    async fn fetch_token(&self, _code: &str) -> Result<ProviderToken, AuthError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.token_error {
            return Err(AuthError::CodeExchangeFailed(error.clone()));
        }
        Ok(ProviderToken {
            access_token: "fake-access-token".to_string(),
            token_type: "bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
            scopes: vec!["openid".to_string(), "email".to_string()],
        })
    }

    async fn get_user_info(&self, _token: &ProviderToken) -> Result<ProviderUserInfo, AuthError> {
        Ok(self.identity.clone())
    }
}

/// SSO settings accepting `example.com` addresses
pub fn sso_config(auto_create_users: bool) -> SsoConfig {
    SsoConfig {
        enabled: true,
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        allowable_domains: vec!["example.com".to_string()],
        auto_create_users,
        session_cookie_age: 1800,
        ..Default::default()
    }
}

/// The full router driven like a browser, carrying the session cookie
pub struct TestApp {
    router: Router,
    pub users: Arc<MemoryUserStore>,
    pub sso: Arc<FakeSsoClient>,
    cookie: Option<String>,
}

impl TestApp {
    pub fn new(sso: SsoConfig, client: FakeSsoClient) -> Self {
        Self::with_hooks(sso, client, &HookRegistry::new())
    }

    pub fn with_hooks(sso: SsoConfig, client: FakeSsoClient, hooks: &HookRegistry) -> Self {
        let config = AppConfig {
            sso,
            ..Default::default()
        };
        let users = Arc::new(MemoryUserStore::new());
        let sso = Arc::new(client);
        let router = build_app(&config, sso.clone(), users.clone(), hooks)
            .expect("test app should build");

        Self {
            router,
            users,
            sso,
            cookie: None,
        }
    }

    pub fn has_session_cookie(&self) -> bool {
        self.cookie.is_some()
    }

    pub async fn get(&mut self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("valid request");
        self.send(request).await
    }

    pub async fn post_form(&mut self, uri: &str, body: &str) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .expect("valid request");
        self.send(request).await
    }

    async fn send(&mut self, mut request: Request<Body>) -> Response<Body> {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().expect("valid cookie"));
        }

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        if let Some(set_cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
        {
            let pair = set_cookie.split(';').next().unwrap_or_default().trim();
            let removed = pair.ends_with('=') || set_cookie.contains("Max-Age=0");
            self.cookie = (!removed).then(|| pair.to_string());
        }

        response
    }

    /// Begin an SSO login and return the state handed to the provider
    pub async fn start_sso(&mut self) -> String {
        let response = self.get("/login/google").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = location(&response);
        let url = url::Url::parse(&location).expect("absolute provider URL");
        url.query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .expect("state in provider URL")
    }
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    String::from_utf8_lossy(&bytes).into_owned()
}
