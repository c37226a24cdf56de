//! Session authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Read the session cookie from the `Cookie` header
//! 2. Verify the token's signature and expiry
//! 3. Load the user row (so plan changes from webhooks apply immediately)
//! 4. Inject an [`AuthContext`] into the request, or reject with HTTP 401

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    models::{
        plan::{Entitlement, Feature},
        user::{USER_COLUMNS, User},
    },
    services::session::{self, SessionError},
};

/// Authentication context attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub entitlement: Entitlement,
}

impl AuthContext {
    pub fn new(user: User) -> Self {
        let entitlement = user.entitlement();
        Self { user, entitlement }
    }

    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    /// Fail with 402 unless the user's plan and status include `feature`.
    pub fn require(&self, feature: Feature) -> Result<(), AppError> {
        if self.entitlement.features.allows(feature) {
            return Ok(());
        }

        let message = if !self.entitlement.status.is_entitled() {
            "An active subscription is required".to_string()
        } else {
            format!(
                "{} requires the {} plan or higher",
                feature.describe(),
                feature.minimum_plan()
            )
        };

        tracing::warn!("User {} denied {:?}: {}", self.user.id, feature, message);
        Err(AppError::PaymentRequired(message))
    }
}

/// Session authentication middleware function.
///
/// # Returns
///
/// - `Ok(Response)` when the cookie carries a valid, unexpired session for an existing user
/// - `Err(AppError::Unauthenticated)` otherwise (401)
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| session::read_cookie(cookies, &state.config.session_cookie_name))
        .filter(|token| !token.is_empty())
        .ok_or_else(AppError::unauthenticated)?;

    let claims = session::verify_token(token, &state.config).map_err(|e| match e {
        SessionError::Expired => AppError::Unauthenticated("Session expired".to_string()),
        SessionError::Invalid => AppError::unauthenticated(),
        SessionError::Signing(msg) => AppError::Internal(msg),
    })?;

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(claims.sub)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(AppError::unauthenticated)?;

    request.extensions_mut().insert(AuthContext::new(user));

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::{Plan, SubscriptionStatus};
    use crate::models::user::test_user;

    #[test]
    fn require_explains_missing_subscription() {
        let auth = AuthContext::new(test_user(Some(Plan::Pro), SubscriptionStatus::Canceled));

        match auth.require(Feature::Chat) {
            Err(AppError::PaymentRequired(message)) => {
                assert_eq!(message, "An active subscription is required")
            }
            other => panic!("expected 402, got {other:?}"),
        }
    }

    #[test]
    fn require_names_the_needed_plan() {
        let auth = AuthContext::new(test_user(Some(Plan::Starter), SubscriptionStatus::Active));

        assert!(auth.require(Feature::Chat).is_ok());
        match auth.require(Feature::History) {
            Err(AppError::PaymentRequired(message)) => {
                assert_eq!(message, "Conversation history requires the pro plan or higher")
            }
            other => panic!("expected 402, got {other:?}"),
        }
    }
}
