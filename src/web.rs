//! HTTP surface: shared state, routing, rendering, and the error boundary.

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use tera::Tera;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::error;

use crate::auth::{SESSION_COOKIE, Session, SessionStore};
use crate::cities::CityDirectory;
use crate::config::ServerConfig;
use crate::forecast::ForecastClient;
use crate::handlers;
use crate::users::UserStore;
use crate::{CitycastError, Result};

/// Cookie carrying a one-shot flash message across a redirect.
const FLASH_COOKIE: &str = "citycast_flash";

/// Shared application state, cloned into every handler.
///
/// There is no module-level login state; the current identity is resolved
/// per request from the session cookie.
#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub sessions: SessionStore,
    pub cities: CityDirectory,
    pub forecast: Arc<ForecastClient>,
    pub templates: Arc<Tera>,
}

/// One-shot message rendered on the next page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flash {
    pub category: String,
    pub message: String,
}

impl Flash {
    #[must_use]
    pub fn new(category: &str, message: impl Into<String>) -> Self {
        Self {
            category: category.to_string(),
            message: message.into(),
        }
    }
}

/// Error boundary for page handlers.
///
/// Anything a handler does not recover from lands here and renders the
/// generic error page instead of tearing the connection down.
pub struct PageError(CitycastError);

impl<E: Into<CitycastError>> From<E> for PageError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Unhandled error reached the page boundary");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(include_str!("../templates/error.html")),
        )
            .into_response()
    }
}

/// Compile the embedded template set.
pub fn build_templates() -> Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("base.html", include_str!("../templates/base.html")),
        ("index.html", include_str!("../templates/index.html")),
        ("login.html", include_str!("../templates/login.html")),
        ("register.html", include_str!("../templates/register.html")),
        (
            "main_weather.html",
            include_str!("../templates/main_weather.html"),
        ),
    ])?;
    Ok(tera)
}

/// Explicit routing table: (method, path) → handler.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/login",
            get(handlers::login_form).post(handlers::login),
        )
        .route(
            "/register",
            get(handlers::register_form).post(handlers::register),
        )
        .route("/logout", get(handlers::logout))
        .route(
            "/main_weather",
            get(handlers::weather_form).post(handlers::weather),
        )
        .route("/cities", get(handlers::cities))
        .nest_service("/static", ServeDir::new("static"))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn run(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Web server running at http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Resolve the current identity from the session cookie, if any.
pub fn current_user(state: &AppState, jar: &CookieJar) -> Option<Session> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.get(cookie.value()))
}

/// Queue a flash message for the next rendered page.
pub fn set_flash(jar: CookieJar, category: &str, message: &str) -> CookieJar {
    let value = format!("{}|{}", category, urlencoding::encode(message));
    let mut cookie = Cookie::new(FLASH_COOKIE, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    jar.add(cookie)
}

/// Consume the pending flash message, if any.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return (jar, None);
    };

    let flash = cookie.value().split_once('|').map(|(category, encoded)| {
        let message = urlencoding::decode(encoded)
            .map(|m| m.into_owned())
            .unwrap_or_default();
        Flash::new(category, message)
    });

    let mut removal = Cookie::new(FLASH_COOKIE, "");
    removal.set_path("/");
    (jar.remove(removal), flash)
}

/// Template context with the fields every page expects.
///
/// Both keys are always present (null when absent) so templates can test
/// them without tripping on undefined variables.
pub fn page_context(user: Option<&Session>, flash: Option<Flash>) -> tera::Context {
    let mut ctx = tera::Context::new();
    ctx.insert("current_user", &user.map(|session| session.username.as_str()));
    ctx.insert("flash", &flash);
    ctx
}

/// Render a template from the shared set.
pub fn render(state: &AppState, name: &str, ctx: &tera::Context) -> Result<Html<String>> {
    Ok(Html(state.templates.render(name, ctx)?))
}
