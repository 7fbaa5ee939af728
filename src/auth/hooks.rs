/// Pre-login hooks
///
/// A deployment picks one hook by name in `sso.pre_login_callback`. The name
/// is resolved against a `HookRegistry` when the application is built, so a
/// typo fails start-up rather than the first login.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::auth::error::AuthError;
use crate::user_repository::LocalUser;

/// Request details handed to a pre-login hook
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub path: String,
    pub client_ip: String,
    pub user_agent: String,
}

/// Side effect run just before an SSO user's session is established
///
/// An error aborts the request with a server error; it is not turned into a
/// login failure message.
#[async_trait]
pub trait PreLoginHook: Send + Sync {
    async fn before_login(&self, user: &LocalUser, request: &RequestContext)
    -> anyhow::Result<()>;
}

/// Does nothing
pub struct NoopHook;

#[async_trait]
impl PreLoginHook for NoopHook {
    async fn before_login(
        &self,
        _user: &LocalUser,
        _request: &RequestContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes one audit line per SSO login
pub struct AuditLogHook;

#[async_trait]
impl PreLoginHook for AuditLogHook {
    async fn before_login(
        &self,
        user: &LocalUser,
        request: &RequestContext,
    ) -> anyhow::Result<()> {
        info!(
            target: "sitegate::audit",
            user_id = %user.id,
            email = %user.email,
            client_ip = %request.client_ip,
            user_agent = %request.user_agent,
            request_id = %request.request_id,
            "SSO login"
        );
        Ok(())
    }
}

/// Named pre-login hooks available to the configuration
#[derive(Clone)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn PreLoginHook>>,
}

impl HookRegistry {
    /// Registry holding the built-in `noop` and `audit_log` hooks
    pub fn new() -> Self {
        let mut registry = Self {
            hooks: HashMap::new(),
        };
        registry.register("noop", Arc::new(NoopHook));
        registry.register("audit_log", Arc::new(AuditLogHook));
        registry
    }

    /// Register (or replace) a hook under `name`
    pub fn register(&mut self, name: &str, hook: Arc<dyn PreLoginHook>) {
        self.hooks.insert(name.to_string(), hook);
    }

    /// Look up the hook configured by name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PreLoginHook>, AuthError> {
        self.hooks
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::UnknownHook(name.to_string()))
    }

    /// Registered hook names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hooks.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
