use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::auth::{password, session};
use crate::db::models::NewUser;
use crate::error::AppResult;
use crate::forum::repository::RepositoryError;
use crate::routes::home::Html;
use crate::routes::{found, found_with_cookie};
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/register.html")]
pub struct RegisterTemplate {
    pub error: Option<&'static str>,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub error: Option<&'static str>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct ErrorQuery {
    pub err: Option<String>,
}

#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Human-readable text for the `?err=` codes the auth redirects carry.
pub fn error_message(code: &str) -> Option<&'static str> {
    match code {
        "email_taken" => Some("That email address is already registered."),
        "username_taken" => Some("That username is already taken."),
        "missing_fields" => Some("Please fill in every field."),
        "invalid_email" => Some("No account uses that email address."),
        "invalid_password" => Some("Wrong password."),
        _ => None,
    }
}

// -- Pages --

/// GET /register
pub async fn register_page(Query(query): Query<ErrorQuery>) -> Html<RegisterTemplate> {
    Html(RegisterTemplate {
        error: query.err.as_deref().and_then(error_message),
    })
}

/// GET /login
pub async fn login_page(Query(query): Query<ErrorQuery>) -> Html<LoginTemplate> {
    Html(LoginTemplate {
        error: query.err.as_deref().and_then(error_message),
    })
}

// -- API --

/// POST /api/register: create the account and log it in
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    let username = form.username.trim().to_string();
    let email = form.email.trim().to_string();
    if username.is_empty() || email.is_empty() || form.password.is_empty() {
        return Ok(found("/register?err=missing_fields"));
    }

    if state.repo.email_taken(&email).await? {
        return Ok(found("/register?err=email_taken"));
    }
    if state.repo.username_taken(&username).await? {
        return Ok(found("/register?err=username_taken"));
    }

    let auth = &state.config.auth;
    let password_hash = password::hash(form.password, auth.bcrypt_cost).await?;
    let token = session::generate_token();
    let expires = session::expiry_after(session::now(), auth.session_days);

    let user = NewUser {
        username,
        email,
        password_hash,
        cookie: token.clone(),
        expires,
    };

    match state.repo.add_user(&user).await {
        Ok(_) => {}
        // Lost a race with a concurrent registration
        Err(RepositoryError::Conflict(_)) => {
            let code = if state.repo.email_taken(&user.email).await? {
                "email_taken"
            } else {
                "username_taken"
            };
            return Ok(found(&format!("/register?err={}", code)));
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!("Added user {} with email {}", user.username, user.email);

    Ok(found_with_cookie(
        "/",
        session::session_cookie(&auth.cookie_name, &token, auth.session_days),
    ))
}

/// POST /api/login: check credentials and issue a fresh session
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_string();

    let Some(creds) = state.repo.credentials(&email).await? else {
        tracing::warn!("Login failed (email not found) for {}", email);
        return Ok(found("/login?err=invalid_email"));
    };

    if !password::verify(form.password, creds.password_hash).await? {
        tracing::warn!("Login failed (wrong password) for {}", email);
        return Ok(found("/login?err=invalid_password"));
    }

    let auth = &state.config.auth;
    let token = session::generate_token();
    let expires = session::expiry_after(session::now(), auth.session_days);
    state
        .repo
        .update_session(&creds.email, &token, &expires)
        .await?;

    tracing::info!("Logged in user {} with email {}", creds.username, creds.email);

    Ok(found_with_cookie(
        "/",
        session::session_cookie(&auth.cookie_name, &token, auth.session_days),
    ))
}

/// GET /api/logout: forget the session server-side and in the browser
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;

    if let Some(token) = session::cookie_value(&headers, cookie_name) {
        if let Some(record) = state.repo.session(token).await? {
            state.repo.clear_session(&record.username).await?;
            tracing::info!("User {} logged out", record.username);
        }
    }

    Ok((
        StatusCode::TEMPORARY_REDIRECT,
        [
            (header::LOCATION, "/".to_string()),
            (header::SET_COOKIE, session::clear_session_cookie(cookie_name)),
        ],
    )
        .into_response())
}
