//! Session tokens and the cookie that carries them.
//!
//! A session is an HS256 JWT with `sub` (user id), `email`, `iat` and `exp`
//! claims, stored in an HTTP-only cookie. Nothing is kept server-side;
//! logging out just expires the cookie.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session expired")]
    Expired,
    #[error("session token invalid")]
    Invalid,
    #[error("failed to sign session token: {0}")]
    Signing(String),
}

/// Issue a signed session token valid for `session_ttl_hours`.
pub fn create_token(user_id: Uuid, email: &str, config: &Config) -> Result<String, SessionError> {
    let now = Utc::now();
    let claims = SessionClaims {
        sub: user_id,
        email: email.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(config.session_ttl_hours)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.session_secret.as_bytes()),
    )
    .map_err(|e| SessionError::Signing(e.to_string()))
}

/// Verify signature and expiry; returns the claims on success.
pub fn verify_token(token: &str, config: &Config) -> Result<SessionClaims, SessionError> {
    let mut validation = Validation::default();
    validation.leeway = 0;

    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(config.session_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => SessionError::Expired,
        _ => SessionError::Invalid,
    })
}

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(token: &str, config: &Config) -> String {
    let max_age = config.session_ttl_hours * 3600;
    cookie_header(&config.session_cookie_name, token, max_age, config.session_cookie_secure)
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie(config: &Config) -> String {
    cookie_header(&config.session_cookie_name, "", 0, config.session_cookie_secure)
}

fn cookie_header(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Find the value of cookie `name` in a `Cookie` request header.
pub fn read_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
