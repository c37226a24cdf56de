//! Authentication HTTP handlers.
//!
//! This module implements the account and session endpoints:
//! - POST /api/v1/auth/signup - Create a password account
//! - POST /api/v1/auth/login - Sign in with email and password
//! - POST /api/v1/auth/magic-link - Email a one-time sign-in link
//! - POST /api/v1/auth/magic-link/verify - Exchange a link token for a session
//! - POST /api/v1/auth/logout - Expire the session cookie
//! - GET /api/v1/auth/me - Current user and entitlement
//!
//! Successful sign-ins answer with a `Set-Cookie` header carrying the
//! session token; the token never appears in a response body.

use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};

use crate::{
    app::AppState,
    config::Config,
    error::AppError,
    extract::AppJson,
    middleware::auth::AuthContext,
    models::user::{
        LoginRequest, MagicLinkRequest, MagicLinkVerifyRequest, SignupRequest, User, UserResponse,
    },
    services::{auth_service, session},
};

/// Issue a session for `user` and build its cookie.
fn session_for(user: &User, config: &Config) -> Result<String, AppError> {
    let token = session::create_token(user.id, &user.email, config)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(session::session_cookie(&token, config))
}

/// Create a password account and sign it in.
///
/// # Request Body
///
/// ```json
/// { "email": "sam@mason-builders.co.uk", "password": "correct horse", "name": "Sam" }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the user, with a session cookie
/// - **Error (400)**: invalid email or password length
/// - **Error (409)**: email already registered
pub async fn signup(
    State(state): State<AppState>,
    AppJson(request): AppJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth_service::signup(&state.pool, request).await?;
    let cookie = session_for(&user, &state.config)?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(UserResponse::from(user)),
    ))
}

/// Sign in with email and password.
///
/// # Response
///
/// - **Success (200 OK)**: the user, with a session cookie
/// - **Error (401)**: unknown email, password-less account or wrong password
///   (one message for all three)
pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth_service::login(&state.pool, request).await?;
    let cookie = session_for(&user, &state.config)?;

    tracing::info!("User {} logged in", user.id);
    Ok(([(header::SET_COOKIE, cookie)], Json(UserResponse::from(user))))
}

/// Email a sign-in link.
///
/// # Response
///
/// - **Accepted (202)**: always, once the link is issued, so the response does
///   not reveal whether the account already existed
/// - **Error (400)**: malformed email
pub async fn request_magic_link(
    State(state): State<AppState>,
    AppJson(request): AppJson<MagicLinkRequest>,
) -> Result<StatusCode, AppError> {
    auth_service::request_magic_link(&state.pool, &state.email, &state.config, request).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Exchange a magic link token for a session.
///
/// # Response
///
/// - **Success (200 OK)**: the user, with a session cookie
/// - **Error (401)**: token unknown, already used or expired
pub async fn verify_magic_link(
    State(state): State<AppState>,
    AppJson(request): AppJson<MagicLinkVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth_service::verify_magic_link(&state.pool, &request.token).await?;
    let cookie = session_for(&user, &state.config)?;

    Ok(([(header::SET_COOKIE, cookie)], Json(UserResponse::from(user))))
}

/// Expire the session cookie. Sessions are stateless, so this is all logout does.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, session::clear_cookie(&state.config))],
    )
}

pub async fn me(Extension(auth): Extension<AuthContext>) -> Json<UserResponse> {
    Json(UserResponse::from(auth.user))
}
