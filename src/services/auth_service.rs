//! Account creation and sign-in: passwords and single-use magic links.
//!
//! # Token Storage
//!
//! Magic link tokens are never stored. Only their SHA-256 digest is kept in
//! `magic_links`, so a database leak does not yield usable links.

use chrono::{Duration, Utc};

use crate::{
    config::Config,
    db::{DbPool, unique_violation},
    error::AppError,
    models::user::{
        LoginRequest, MagicLinkRequest, SignupRequest, USER_COLUMNS, User, normalize_email,
    },
    services::{
        email_service::EmailService,
        password::{generate_token, hash_password, hash_token, validate_password, verify_password},
    },
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

fn parse_email(email: &str) -> Result<String, AppError> {
    normalize_email(email)
        .ok_or_else(|| AppError::InvalidRequest("A valid email address is required".to_string()))
}

/// Create a password account.
///
/// # Process
///
/// 1. Normalize the email and check password length
/// 2. Hash the password with Argon2id on a blocking thread
/// 3. Insert the user; `users_email_unique` turns a duplicate into 409
pub async fn signup(pool: &DbPool, request: SignupRequest) -> Result<User, AppError> {
    let email = parse_email(&request.email)?;
    validate_password(&request.password)?;

    let name = request
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))??;

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (email, name, password_hash) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
    ))
    .bind(&email)
    .bind(name)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .map_err(|e| match unique_violation(&e) {
        Some(_) => AppError::Conflict("An account with this email already exists".to_string()),
        None => AppError::Database(e),
    })?;

    tracing::info!("User {} signed up", user.id);
    Ok(user)
}

/// Check an email and password.
///
/// # Security
///
/// Unknown emails, password-less accounts and wrong passwords all produce
/// the same 401 so the response does not reveal which accounts exist.
pub async fn login(pool: &DbPool, request: LoginRequest) -> Result<User, AppError> {
    let rejected = || AppError::Unauthenticated(INVALID_CREDENTIALS.to_string());

    let email = normalize_email(&request.email).ok_or_else(rejected)?;

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(&email)
        .fetch_optional(pool)
        .await?
        .ok_or_else(rejected)?;

    let Some(stored_hash) = user.password_hash.clone() else {
        return Err(rejected());
    };

    let password = request.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))??;

    if !matches {
        tracing::warn!("Failed login for user {}", user.id);
        return Err(rejected());
    }

    Ok(user)
}

/// Find the user for `email`, creating a password-less account if none exists.
///
/// The insert is guarded by `users_email_unique`; a concurrent creator wins
/// and this call reads its row.
async fn find_or_create_user(pool: &DbPool, email: &str) -> Result<User, AppError> {
    sqlx::query("INSERT INTO users (email) VALUES ($1) ON CONFLICT (email) DO NOTHING")
        .bind(email)
        .execute(pool)
        .await?;

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email)
        .fetch_one(pool)
        .await?;

    Ok(user)
}

/// Link a user signs in with, e.g. `https://app.example/auth/verify?token=…`.
pub fn magic_link_url(app_base_url: &str, token: &str) -> String {
    format!("{}/auth/verify?token={}", app_base_url.trim_end_matches('/'), token)
}

/// Issue a magic link and email it.
///
/// The caller always answers 202 once this returns, whether or not the
/// account existed beforehand.
pub async fn request_magic_link(
    pool: &DbPool,
    email_service: &EmailService,
    config: &Config,
    request: MagicLinkRequest,
) -> Result<(), AppError> {
    let email = parse_email(&request.email)?;
    let user = find_or_create_user(pool, &email).await?;

    let token = generate_token();
    let expires_at = Utc::now() + Duration::minutes(config.magic_link_ttl_minutes);

    sqlx::query("INSERT INTO magic_links (user_id, token_hash, expires_at) VALUES ($1, $2, $3)")
        .bind(user.id)
        .bind(hash_token(&token))
        .bind(expires_at)
        .execute(pool)
        .await?;

    let link = magic_link_url(&config.app_base_url, &token);
    email_service
        .send_magic_link(&user.email, &link, config.magic_link_ttl_minutes)
        .await?;

    tracing::info!("Magic link issued for user {}", user.id);
    Ok(())
}

/// Consume a magic link token and return its user.
///
/// The `UPDATE` only matches an unconsumed, unexpired row, so two
/// concurrent verifications cannot both succeed.
pub async fn verify_magic_link(pool: &DbPool, token: &str) -> Result<User, AppError> {
    let rejected = || AppError::Unauthenticated("This sign-in link is invalid or has expired".to_string());

    if token.trim().is_empty() {
        return Err(rejected());
    }

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        WITH consumed AS (
            UPDATE magic_links
            SET consumed_at = NOW()
            WHERE token_hash = $1
              AND consumed_at IS NULL
              AND expires_at > NOW()
            RETURNING user_id
        )
        SELECT {USER_COLUMNS} FROM users WHERE id = (SELECT user_id FROM consumed)
        "#
    ))
    .bind(hash_token(token.trim()))
    .fetch_optional(pool)
    .await?
    .ok_or_else(rejected)?;

    tracing::info!("User {} signed in with a magic link", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_link_points_at_the_client_verify_page() {
        assert_eq!(
            magic_link_url("https://app.buildmate.co.uk/", "abc_123"),
            "https://app.buildmate.co.uk/auth/verify?token=abc_123"
        );
    }

    #[test]
    fn bad_emails_are_validation_errors() {
        assert!(matches!(parse_email("not-an-email"), Err(AppError::InvalidRequest(_))));
        assert_eq!(parse_email(" Sam@Example.com ").unwrap(), "sam@example.com");
    }
}
