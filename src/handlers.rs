//! Page handlers and their form schemas.
//!
//! Flows mirror the classic form-login shape: validation and
//! authentication failures re-render the form with a message (HTTP 200),
//! successes redirect. Protected pages bounce anonymous visitors to the
//! login form.

use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::auth::{SESSION_COOKIE, Session};
use crate::cities::CityEntry;
use crate::forecast::ForecastTable;
use crate::web::{self, AppState, Flash, PageError};

/// Shared message for unknown-user and wrong-password logins; the two
/// cases must stay observably identical.
const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CityForm {
    pub city: String,
}

/// `GET /`: public landing page.
pub async fn index(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, PageError> {
    let (jar, flash) = web::take_flash(jar);
    let user = web::current_user(&state, &jar);
    let ctx = web::page_context(user.as_ref(), flash);
    Ok((jar, web::render(&state, "index.html", &ctx)?).into_response())
}

/// `GET /login`: login form.
pub async fn login_form(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, PageError> {
    let (jar, flash) = web::take_flash(jar);
    let user = web::current_user(&state, &jar);
    let ctx = web::page_context(user.as_ref(), flash);
    Ok((jar, web::render(&state, "login.html", &ctx)?).into_response())
}

/// `POST /login`: authenticate and open a session.
#[instrument(skip(state, jar, form))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, PageError> {
    let (jar, _) = web::take_flash(jar);

    match state
        .users
        .authenticate(&form.username, &form.password)
        .await?
    {
        Some(user) => {
            let token = state.sessions.create(user.id, &user.username);
            info!(username = %user.username, "User logged in");

            let mut cookie = Cookie::new(SESSION_COOKIE, token);
            cookie.set_path("/");
            cookie.set_http_only(true);
            let jar = jar.add(cookie);
            let jar = web::set_flash(jar, "success", "You have logged in successfully.");
            Ok((jar, Redirect::to("/main_weather")).into_response())
        }
        None => {
            warn!("Failed login attempt");
            let ctx = web::page_context(None, Some(Flash::new("danger", INVALID_CREDENTIALS)));
            Ok((jar, web::render(&state, "login.html", &ctx)?).into_response())
        }
    }
}

/// `GET /register`: registration form.
pub async fn register_form(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, PageError> {
    let (jar, flash) = web::take_flash(jar);
    let user = web::current_user(&state, &jar);
    let ctx = web::page_context(user.as_ref(), flash);
    Ok((jar, web::render(&state, "register.html", &ctx)?).into_response())
}

/// `POST /register`: create a user, or redisplay on conflict.
#[instrument(skip(state, jar, form))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, PageError> {
    let (jar, _) = web::take_flash(jar);

    match state
        .users
        .create(&form.username, &form.email, &form.password)
        .await
    {
        Ok(user) => {
            info!(username = %user.username, "User registered");
            let jar = web::set_flash(
                jar,
                "success",
                "Registration complete. You can now log in.",
            );
            Ok((jar, Redirect::to("/login")).into_response())
        }
        Err(err @ crate::CitycastError::Conflict { .. }) => {
            let ctx = web::page_context(None, Some(Flash::new("danger", err.user_message())));
            Ok((jar, web::render(&state, "register.html", &ctx)?).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

/// `GET /logout`: close the session; requires authentication.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if web::current_user(&state, &jar).is_none() {
        return Redirect::to("/login").into_response();
    }

    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    let jar = jar.remove(removal);

    (jar, Redirect::to("/login")).into_response()
}

/// Render the forecast page; the forecast key is always present so the
/// template can test it.
fn weather_page(
    state: &AppState,
    user: &Session,
    flash: Option<Flash>,
    forecast: Option<&ForecastTable>,
) -> Result<axum::response::Html<String>, PageError> {
    let mut ctx = web::page_context(Some(user), flash);
    ctx.insert("forecast", &forecast);
    Ok(web::render(state, "main_weather.html", &ctx)?)
}

/// `GET /main_weather`: empty forecast form; requires authentication.
pub async fn weather_form(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, PageError> {
    let (jar, flash) = web::take_flash(jar);
    let Some(user) = web::current_user(&state, &jar) else {
        return Ok(Redirect::to("/login").into_response());
    };

    let page = weather_page(&state, &user, flash, None)?;
    Ok((jar, page).into_response())
}

/// `POST /main_weather`: look up a forecast; requires authentication.
///
/// Blank input is rejected before any external call is made. Forecast
/// client failures, city-not-found included, are reported on the page.
#[instrument(skip(state, jar, form))]
pub async fn weather(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CityForm>,
) -> Result<Response, PageError> {
    let (jar, _) = web::take_flash(jar);
    let Some(user) = web::current_user(&state, &jar) else {
        return Ok(Redirect::to("/login").into_response());
    };

    let city = form.city.trim();
    if city.is_empty() {
        let flash = Flash::new("error", "Please enter a city name");
        let page = weather_page(&state, &user, Some(flash), None)?;
        return Ok((jar, page).into_response());
    }

    match state.forecast.get_forecast(city).await {
        Ok(table) => {
            let page = weather_page(&state, &user, None, Some(&table))?;
            Ok((jar, page).into_response())
        }
        Err(err) => {
            warn!(error = %err, city, "Forecast lookup failed");
            let flash = Flash::new("error", err.user_message());
            let page = weather_page(&state, &user, Some(flash), None)?;
            Ok((jar, page).into_response())
        }
    }
}

/// `GET /cities`: the full city dataset as structured data.
pub async fn cities(State(state): State<AppState>) -> Result<Json<Vec<CityEntry>>, PageError> {
    let entries = state.cities.load()?;
    Ok(Json(entries))
}

/// Fallback for unknown routes.
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}
