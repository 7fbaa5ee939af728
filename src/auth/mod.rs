// Authentication Module
// Google SSO login, password login and session-backed authentication state

pub mod config;
pub mod controller;
pub mod error;
pub mod hooks;
pub mod password;
pub mod providers;
pub mod routes;
pub mod session;
pub mod user_helper;

pub use config::SsoConfig;
pub use controller::{CallbackParams, LoginController, LoginFailure, LoginOutcome, LoginStart};
pub use error::AuthError;
pub use hooks::{HookRegistry, PreLoginHook, RequestContext};
pub use providers::{GoogleSsoClient, SsoClient};
pub use routes::{AppState, create_router};
