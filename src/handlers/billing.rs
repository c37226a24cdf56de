//! Billing HTTP handlers.
//!
//! - POST /api/v1/billing/checkout - Start a hosted checkout for a plan
//! - POST /api/v1/billing/portal - Open the hosted billing portal
//! - GET /api/v1/billing/subscription - Current plan, status and features
//! - POST /api/v1/billing/webhook - Stripe event receiver (unauthenticated)

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde_json::{Value, json};

use crate::{
    app::AppState,
    error::AppError,
    extract::AppJson,
    middleware::auth::AuthContext,
    models::billing::{
        BillingEvent, CheckoutRequest, RedirectResponse, SubscriptionResponse,
    },
    services::subscription_service::{PgSubscriptionStore, apply_event},
};

pub async fn checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppJson(request): AppJson<CheckoutRequest>,
) -> Result<Json<RedirectResponse>, AppError> {
    let url = state
        .stripe
        .create_checkout_session(&auth.user, request.plan)
        .await?;

    tracing::info!("User {} started checkout for {}", auth.user_id(), request.plan);
    Ok(Json(RedirectResponse { url }))
}

/// Open the billing portal for the user's Stripe customer.
///
/// # Response
///
/// - **Success (200 OK)**: `{ "url": "https://billing.stripe.com/..." }`
/// - **Error (400)**: the user has never completed a checkout
pub async fn portal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<RedirectResponse>, AppError> {
    let customer_id = auth.user.stripe_customer_id.as_deref().ok_or_else(|| {
        AppError::InvalidRequest("No billing account yet; choose a plan first".to_string())
    })?;

    let url = state.stripe.create_portal_session(customer_id).await?;
    Ok(Json(RedirectResponse { url }))
}

pub async fn subscription(Extension(auth): Extension<AuthContext>) -> Json<SubscriptionResponse> {
    Json(SubscriptionResponse {
        entitlement: auth.entitlement,
        has_billing_account: auth.user.stripe_customer_id.is_some(),
    })
}

/// Receive a Stripe webhook event.
///
/// # Security
///
/// The `Stripe-Signature` header is checked against the raw body before the
/// event is trusted. A missing or invalid signature, or one older than the
/// tolerance window, is rejected with 400.
///
/// # Response
///
/// - **Success (200 OK)**: `{ "received": true }`, including for events about
///   customers or users this service doesn't know
/// - **Error (400)**: bad signature or unparseable payload
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::InvalidSignature("missing Stripe-Signature header".to_string()))?;

    let payload = std::str::from_utf8(&body)
        .map_err(|_| AppError::InvalidRequest("Webhook body is not UTF-8".to_string()))?;

    let stripe_event = state.stripe.verify_webhook(signature, payload)?;
    let event_id = stripe_event.id.to_string();

    let event = BillingEvent::from_stripe(stripe_event.type_, stripe_event.data.object).map_err(|e| {
        tracing::warn!("Rejected webhook {}: {}", event_id, e);
        AppError::InvalidRequest(e.to_string())
    })?;

    let store = PgSubscriptionStore::new(&state.pool);
    let outcome = apply_event(&store, &state.stripe, event).await?;

    tracing::info!("Webhook {} processed: {:?}", event_id, outcome);
    Ok(Json(json!({ "received": true })))
}
