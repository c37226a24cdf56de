//! User records and the auth request/response bodies built around them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::plan::{Entitlement, Plan, SubscriptionStatus};

/// Represents a user record from the database.
///
/// `plan` and `subscription_status` are mirrored from billing webhooks and
/// are never written by the user directly. `password_hash` is `None` for
/// accounts created through a magic link.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub plan: Option<String>,
    pub subscription_status: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const USER_COLUMNS: &str = "id, email, name, password_hash, plan, subscription_status, \
     stripe_customer_id, stripe_subscription_id, created_at, updated_at";

impl User {
    /// Parsed plan; an unrecognised value is treated as no plan.
    pub fn plan(&self) -> Option<Plan> {
        self.plan.as_deref().and_then(|p| match p.parse() {
            Ok(plan) => Some(plan),
            Err(e) => {
                tracing::warn!("User {} has {}", self.id, e);
                None
            }
        })
    }

    /// Parsed subscription status; an unrecognised value is treated as `none`.
    pub fn subscription_status(&self) -> SubscriptionStatus {
        self.subscription_status
            .parse()
            .unwrap_or(SubscriptionStatus::None)
    }

    pub fn entitlement(&self) -> Entitlement {
        Entitlement::for_user(self.plan(), self.subscription_status())
    }
}

/// Request body for `POST /api/v1/auth/signup`.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Request body for `POST /api/v1/auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for `POST /api/v1/auth/magic-link`.
#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

/// Request body for `POST /api/v1/auth/magic-link/verify`.
#[derive(Debug, Deserialize)]
pub struct MagicLinkVerifyRequest {
    pub token: String,
}

/// Public view of a user, with their effective entitlement.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub has_password: bool,
    pub entitlement: Entitlement,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let entitlement = user.entitlement();
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            has_password: user.password_hash.is_some(),
            entitlement,
            created_at: user.created_at,
        }
    }
}

/// Normalize and minimally validate an email address.
///
/// Emails are stored lowercased so the unique constraint is effectively
/// case-insensitive.
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;

    if local.is_empty()
        || domain.len() < 3
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.len() > 254
        || email.chars().any(char::is_whitespace)
    {
        return None;
    }

    Some(email)
}

#[cfg(test)]
pub(crate) fn test_user(plan: Option<Plan>, status: SubscriptionStatus) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        email: "builder@example.co.uk".to_string(),
        name: Some("Sam Mason".to_string()),
        password_hash: None,
        plan: plan.map(|p| p.as_str().to_string()),
        subscription_status: status.as_str().to_string(),
        stripe_customer_id: None,
        stripe_subscription_id: None,
        created_at: now,
        updated_at: now,
    }
}
