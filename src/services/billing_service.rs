//! Stripe integration: hosted checkout, billing portal and webhook events.
//!
//! Requests go through `async-stripe`'s typed session endpoints. Incoming
//! webhooks are checked and parsed with [`stripe::Webhook::construct_event`],
//! which enforces the `t=…,v1=…` signature scheme and its replay window.

use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, CreateBillingPortalSession,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CustomerId, Event, Metadata, Webhook,
    WebhookError,
};

use crate::{
    config::Config,
    error::AppError,
    models::{plan::Plan, user::User},
};

#[derive(Clone)]
pub struct StripeClient {
    client: Option<stripe::Client>,
    webhook_secret: Option<String>,
    prices: Vec<(Plan, String)>,
    app_base_url: String,
}

/// Redirect targets for a hosted checkout.
struct CheckoutUrls {
    success: String,
    cancel: String,
}

impl StripeClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let prices = [
            (Plan::Starter, &config.stripe_price_starter),
            (Plan::Pro, &config.stripe_price_pro),
            (Plan::Team, &config.stripe_price_team),
        ]
        .into_iter()
        .filter_map(|(plan, price)| price.clone().map(|price| (plan, price)))
        .collect();

        Ok(Self {
            client: config.stripe_secret_key.as_deref().map(stripe::Client::new),
            webhook_secret: config.stripe_webhook_secret.clone(),
            prices,
            app_base_url: config.app_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn price_for(&self, plan: Plan) -> Option<&str> {
        self.prices
            .iter()
            .find(|(p, _)| *p == plan)
            .map(|(_, price)| price.as_str())
    }

    pub fn plan_for_price(&self, price_id: &str) -> Option<Plan> {
        self.prices
            .iter()
            .find(|(_, price)| price == price_id)
            .map(|(plan, _)| *plan)
    }

    fn client(&self) -> Result<&stripe::Client, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Internal("Billing is not configured (STRIPE_SECRET_KEY)".to_string()))
    }

    fn checkout_urls(&self) -> CheckoutUrls {
        CheckoutUrls {
            success: format!("{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}", self.app_base_url),
            cancel: format!("{}/billing", self.app_base_url),
        }
    }

    /// Parameters for a subscription-mode checkout of `plan`.
    ///
    /// The user id travels as `client_reference_id` and the plan as
    /// `metadata.plan`, so the `checkout.session.completed` webhook can link
    /// the new customer back to the user. A user who already has a customer
    /// reuses it; anyone else is identified by email.
    fn checkout_params<'a>(
        &'a self,
        user: &'a User,
        plan: Plan,
        user_ref: &'a str,
        urls: &'a CheckoutUrls,
    ) -> Result<CreateCheckoutSession<'a>, AppError> {
        let price = self
            .price_for(plan)
            .ok_or_else(|| AppError::Internal(format!("No Stripe price configured for {plan}")))?;

        let metadata: Metadata = [("plan".to_string(), plan.as_str().to_string())].into();

        let mut params = CreateCheckoutSession {
            cancel_url: Some(&urls.cancel),
            success_url: Some(&urls.success),
            client_reference_id: Some(user_ref),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price.to_string()),
                quantity: Some(1),
                ..Default::default()
            }]),
            mode: Some(CheckoutSessionMode::Subscription),
            metadata: Some(metadata),
            ..Default::default()
        };

        match &user.stripe_customer_id {
            Some(customer) => params.customer = Some(parse_customer_id(customer)?),
            None => params.customer_email = Some(&user.email),
        }

        Ok(params)
    }

    /// Create a hosted Checkout session in subscription mode and return its URL.
    pub async fn create_checkout_session(&self, user: &User, plan: Plan) -> Result<String, AppError> {
        let client = self.client()?;
        let urls = self.checkout_urls();
        let user_ref = user.id.to_string();
        let params = self.checkout_params(user, plan, &user_ref, &urls)?;

        let session = CheckoutSession::create(client, params)
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe checkout failed: {e}")))?;
        tracing::info!("Created checkout session {} for user {} ({})", session.id, user.id, plan);

        session
            .url
            .ok_or_else(|| AppError::Upstream("Checkout session missing URL".to_string()))
    }

    /// Create a billing-portal session for an existing customer.
    pub async fn create_portal_session(&self, customer_id: &str) -> Result<String, AppError> {
        let client = self.client()?;
        let return_url = format!("{}/billing", self.app_base_url);

        let mut params = CreateBillingPortalSession::new(parse_customer_id(customer_id)?);
        params.return_url = Some(&return_url);

        let session = BillingPortalSession::create(client, params)
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe portal failed: {e}")))?;

        Ok(session.url)
    }

    /// Check a webhook's `Stripe-Signature` header against the raw body and
    /// parse the event.
    ///
    /// A bad, missing or stale signature is `InvalidSignature`; a correctly
    /// signed body that isn't an event is `InvalidRequest`.
    pub fn verify_webhook(&self, signature_header: &str, payload: &str) -> Result<Event, AppError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::Internal("Billing is not configured (STRIPE_WEBHOOK_SECRET)".to_string()))?;

        Webhook::construct_event(payload, signature_header, secret).map_err(|e| match e {
            WebhookError::BadParse(e) => AppError::InvalidRequest(format!("Invalid event payload: {e}")),
            other => AppError::InvalidSignature(other.to_string()),
        })
    }
}

fn parse_customer_id(customer_id: &str) -> Result<CustomerId, AppError> {
    customer_id
        .parse()
        .map_err(|e| AppError::Internal(format!("Stored customer id {customer_id:?} is invalid: {e}")))
}

/// Produce a `Stripe-Signature` header for `payload`; used by tests.
#[cfg(test)]
pub(crate) fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> String {
    use hmac::{Hmac, Mac};

    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
