/// Site Routes
///
/// HTTP handlers for the home page, signup, password and Google SSO login
/// (the `/login` view doubles as the OAuth2 callback), and logout.
use axum::{
    Extension, Form, Router,
    extract::{Query, State, rejection::FormRejection},
    http::{HeaderMap, Uri, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_sessions::Session;
use tracing::{debug, info};

use crate::auth::controller::{CallbackParams, LoginController, LoginOutcome, LoginStart};
use crate::auth::hooks::RequestContext;
use crate::auth::session::{self, MODEL_BACKEND};
use crate::error::AppResult;
use crate::forms::{FormErrors, LoginForm, SignupForm};
use crate::messages::{self, FlashMessage};
use crate::middleware::RequestId;
use crate::templates::Templates;
use crate::user_repository::{LocalUser, UserStore};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub controller: Arc<LoginController>,
    pub templates: Arc<Templates>,
}

/// Extract client IP from headers
fn get_client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Extract user agent from headers
fn get_user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn request_context(headers: &HeaderMap, uri: &Uri, request_id: Option<RequestId>) -> RequestContext {
    RequestContext {
        request_id: request_id.map(|id| id.0).unwrap_or_default(),
        path: uri.path().to_string(),
        client_ip: get_client_ip(headers),
        user_agent: get_user_agent(headers),
    }
}

/// The logged-in user as shown in templates
#[derive(Debug, Serialize)]
struct UserView {
    username: String,
    email: String,
    display_name: String,
}

impl From<&LocalUser> for UserView {
    fn from(user: &LocalUser) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            display_name: user.display_name(),
        }
    }
}

/// Data shared by every page, plus the page's own fields
#[derive(Serialize)]
struct Page<'a, T: Serialize> {
    title: &'a str,
    user: Option<UserView>,
    messages: Vec<FlashMessage>,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize)]
struct IndexPage {}

#[derive(Serialize)]
struct LoginPage<'a> {
    sso_enabled: bool,
    username: &'a str,
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct SignupValues<'a> {
    username: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
struct SignupPage<'a> {
    form: SignupValues<'a>,
    errors: FormErrors,
}

/// Render a page, draining queued flash messages into it
async fn render_page<T: Serialize>(
    state: &AppState,
    session: &Session,
    name: &str,
    title: &str,
    body: T,
) -> AppResult<Html<String>> {
    let user = session::current_user(session, state.users.as_ref()).await?;
    let messages = messages::take_messages(session).await?;

    let html = state.templates.render(
        name,
        &Page {
            title,
            user: user.as_ref().map(UserView::from),
            messages,
            body,
        },
    )?;

    Ok(Html(html))
}

/// Home page
async fn index(State(state): State<AppState>, session: Session) -> AppResult<Html<String>> {
    render_page(&state, &session, "index", "Home", IndexPage {}).await
}

async fn signup_page(State(state): State<AppState>, session: Session) -> AppResult<Html<String>> {
    let body = SignupPage {
        form: SignupValues {
            username: "",
            email: "",
        },
        errors: FormErrors::default(),
    };
    render_page(&state, &session, "signup", "Sign up", body).await
}

async fn signup(
    State(state): State<AppState>,
    session: Session,
    form: Result<Form<SignupForm>, FormRejection>,
) -> AppResult<Response> {
    let form = form.map(|Form(form)| form).unwrap_or_default();

    let errors = form.validate(state.users.as_ref()).await?;
    if !errors.is_empty() {
        let body = SignupPage {
            form: SignupValues {
                username: form.username.trim(),
                email: form.email.trim(),
            },
            errors,
        };
        return Ok(render_page(&state, &session, "signup", "Sign up", body)
            .await?
            .into_response());
    }

    let user = form.save(state.users.as_ref()).await?;
    messages::success(
        &session,
        format!("Account {} created. You can now log in.", user.username),
    )
    .await?;

    Ok(Redirect::to("/login").into_response())
}

async fn render_login(
    state: &AppState,
    session: &Session,
    username: &str,
    error: Option<&str>,
) -> AppResult<Response> {
    let body = LoginPage {
        sso_enabled: state.controller.is_enabled(),
        username,
        error,
    };
    Ok(render_page(state, session, "login", "Log in", body)
        .await?
        .into_response())
}

/// Finish an SSO login and send the browser home
async fn sso_callback(
    state: &AppState,
    session: &Session,
    params: &CallbackParams,
    request: &RequestContext,
) -> AppResult<Response> {
    match state.controller.complete_login(session, params, request).await? {
        LoginOutcome::LoggedIn(user) => {
            debug!("Redirecting user {} after SSO login", user.id);
        }
        LoginOutcome::Rejected(failure) => {
            if let Some(message) = failure.message() {
                messages::error(session, message).await?;
            }
        }
    }

    Ok(Redirect::to("/").into_response())
}

/// `GET /login`: the login form, or the SSO callback when the provider sent us back
async fn login_page(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    uri: Uri,
) -> AppResult<Response> {
    if params.is_callback() {
        let request = request_context(&headers, &uri, request_id.map(|Extension(id)| id));
        return sso_callback(&state, &session, &params, &request).await;
    }

    render_login(&state, &session, "", None).await
}

/// `POST /login`: password login, unless the query carries SSO callback parameters
async fn login(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    uri: Uri,
    form: Result<Form<LoginForm>, FormRejection>,
) -> AppResult<Response> {
    if params.is_callback() {
        let request = request_context(&headers, &uri, request_id.map(|Extension(id)| id));
        return sso_callback(&state, &session, &params, &request).await;
    }

    let form = form.map(|Form(form)| form).unwrap_or_default();
    match form.authenticate(state.users.as_ref()).await? {
        Some(user) => {
            session::login(&session, state.users.as_ref(), &user, MODEL_BACKEND).await?;
            Ok(Redirect::to("/").into_response())
        }
        None => {
            info!("Password login failed for {:?}", form.username.trim());
            render_login(
                &state,
                &session,
                form.username.trim(),
                Some(LoginForm::INVALID_LOGIN),
            )
            .await
        }
    }
}

/// Start the Google SSO flow - redirects to the provider
async fn start_sso(State(state): State<AppState>, session: Session) -> AppResult<Response> {
    match state.controller.start_login(&session).await? {
        LoginStart::Redirect(url) => Ok(Redirect::to(&url).into_response()),
        LoginStart::Rejected(failure) => {
            if let Some(message) = failure.message() {
                messages::error(&session, message).await?;
            }
            Ok(Redirect::to("/").into_response())
        }
    }
}

/// Logout handler - destroys the session
async fn logout(session: Session) -> AppResult<Redirect> {
    session::logout(&session).await?;
    Ok(Redirect::to("/login"))
}

/// Create the site router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index).post(index))
        .route("/signup", get(signup_page).post(signup))
        .route("/login", get(login_page).post(login))
        .route("/login/google", get(start_sso))
        .route("/logout", get(logout).post(logout))
        .with_state(state)
}
