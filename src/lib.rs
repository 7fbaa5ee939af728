use axum::Router;
use axum_server::Server;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tower_sessions::{MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing::{debug, info};

pub mod auth;
pub mod config;
pub mod error;
pub mod forms;
pub mod messages;
pub mod middleware;
pub mod templates;
pub mod user_repository;

use auth::{AppState, GoogleSsoClient, HookRegistry, LoginController, SsoClient, create_router};
use config::{AppConfig, SessionConfig};
use templates::Templates;
use user_repository::{MemoryUserStore, UserStore};

/// Assemble the application state
///
/// Fails when the configured pre-login hook is not registered or a template
/// does not compile.
pub fn build_state(
    config: &AppConfig,
    client: Arc<dyn SsoClient>,
    users: Arc<dyn UserStore>,
    hooks: &HookRegistry,
) -> anyhow::Result<AppState> {
    let controller =
        LoginController::from_registry(config.sso.clone(), client, users.clone(), hooks)?;
    let templates = Templates::new()?;

    Ok(AppState {
        users,
        controller: Arc::new(controller),
        templates: Arc::new(templates),
    })
}

/// Wrap the routes with sessions, request tracing and request IDs
pub fn build_router(state: AppState, session: &SessionConfig) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_name(session.cookie_name.clone())
        .with_secure(session.secure)
        .with_http_only(true)
        .with_same_site(SameSite::Lax);

    create_router(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
}

/// Build the router for `config` from explicit collaborators
pub fn build_app(
    config: &AppConfig,
    client: Arc<dyn SsoClient>,
    users: Arc<dyn UserStore>,
    hooks: &HookRegistry,
) -> anyhow::Result<Router> {
    let state = build_state(config, client, users, hooks)?;
    Ok(build_router(state, &config.session))
}

/// Starts the web server with custom configuration
///
/// Uses the Google client, an in-memory user store and the built-in hooks.
pub async fn start_server_with_config(
    config: AppConfig,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    config.validate()?;

    let client = Arc::new(GoogleSsoClient::new(&config.sso)?);
    debug!("SSO provider: {}", client.name());
    let users = Arc::new(MemoryUserStore::new());
    let hooks = HookRegistry::new();
    debug!("Registered pre-login hooks: {:?}", hooks.names());
    let app = build_app(&config, client, users, &hooks)?;

    let addr = config
        .server_addr()
        .parse::<std::net::SocketAddr>()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    info!("listening on {}", addr);
    debug!(
        "Server configuration - host: {}, port: {}, sso enabled: {}",
        config.server.host, config.server.port, config.sso.enabled
    );
    let svc = app.into_make_service();
    let server = Server::bind(addr).serve(svc);

    tokio::select! {
        res = server => { res? },
        _ = &mut shutdown_rx => { info!("shutdown requested, stopping server"); }
    }

    Ok(())
}
