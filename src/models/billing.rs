//! Billing request bodies and the webhook event model.
//!
//! # Webhook Flow
//!
//! 1. Stripe POSTs a signed event to `/api/v1/billing/webhook`
//! 2. The signature is verified against the raw body and the typed event parsed
//! 3. The event is narrowed to a [`BillingEvent`]
//! 4. The event is applied to the matching user's subscription columns
//!
//! Only the handful of fields the mirror needs are read from each object;
//! everything else in Stripe's objects is ignored.

use serde::{Deserialize, Serialize};
use stripe::{Customer, EventObject, EventType, Expandable, Metadata, Price};
use uuid::Uuid;

use crate::models::plan::{Entitlement, Plan, SubscriptionStatus};

/// Request body for `POST /api/v1/billing/checkout`.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: Plan,
}

/// Response carrying a hosted page URL (checkout or billing portal).
#[derive(Debug, Serialize)]
pub struct RedirectResponse {
    pub url: String,
}

/// Response body for `GET /api/v1/billing/subscription`.
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub entitlement: Entitlement,
    pub has_billing_account: bool,
}

/// Subscription lifecycle events the mirror reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    /// `checkout.session.completed`: links the billing customer to a user.
    CheckoutCompleted {
        user_id: Option<Uuid>,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        plan: Option<Plan>,
    },
    /// `customer.subscription.created` / `customer.subscription.updated`.
    SubscriptionChanged {
        customer_id: String,
        subscription_id: String,
        status: SubscriptionStatus,
        price_id: Option<String>,
        metadata_plan: Option<Plan>,
    },
    /// `customer.subscription.deleted`.
    SubscriptionDeleted {
        customer_id: String,
        subscription_id: String,
    },
    /// `invoice.payment_failed`.
    PaymentFailed { customer_id: String },
    /// Any other event type; acknowledged and ignored.
    Ignored { event_type: String },
}

#[derive(Debug, thiserror::Error)]
#[error("{event_type} event is missing `{field}`")]
pub struct MalformedEvent {
    pub event_type: String,
    pub field: &'static str,
}

fn metadata_plan<'a>(metadata: impl Into<Option<&'a Metadata>>) -> Option<Plan> {
    let metadata: Option<&Metadata> = metadata.into();
    metadata?.get("plan")?.parse().ok()
}

fn customer_id<'a>(customer: impl Into<Option<&'a Expandable<Customer>>>) -> Option<String> {
    let customer: Option<&Expandable<Customer>> = customer.into();
    customer
        .map(|customer| customer.id().to_string())
        .filter(|id| !id.is_empty())
}

fn price_id<'a>(price: impl Into<Option<&'a Price>>) -> Option<String> {
    let price: Option<&Price> = price.into();
    price.map(|price| price.id.to_string())
}

impl BillingEvent {
    /// Narrow a verified Stripe event to the fields the mirror needs.
    ///
    /// A handled event type whose object is not the expected kind, or lacks a
    /// customer, is malformed.
    pub fn from_stripe(event_type: EventType, object: EventObject) -> Result<Self, MalformedEvent> {
        let name = format!("{event_type:?}");
        let malformed = |field: &'static str| MalformedEvent {
            event_type: name.clone(),
            field,
        };

        let event = match (&event_type, object) {
            (EventType::CheckoutSessionCompleted, EventObject::CheckoutSession(session)) => {
                BillingEvent::CheckoutCompleted {
                    user_id: session
                        .client_reference_id
                        .as_deref()
                        .and_then(|id| id.parse().ok()),
                    customer_id: customer_id(session.customer.as_ref()),
                    subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
                    plan: metadata_plan(&session.metadata),
                }
            }
            (
                EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated,
                EventObject::Subscription(subscription),
            ) => BillingEvent::SubscriptionChanged {
                customer_id: customer_id(&subscription.customer).ok_or_else(|| malformed("customer"))?,
                subscription_id: subscription.id.to_string(),
                status: SubscriptionStatus::from_provider(subscription.status.as_str()),
                price_id: subscription
                    .items
                    .data
                    .first()
                    .and_then(|item| price_id(&item.price)),
                metadata_plan: metadata_plan(&subscription.metadata),
            },
            (EventType::CustomerSubscriptionDeleted, EventObject::Subscription(subscription)) => {
                BillingEvent::SubscriptionDeleted {
                    customer_id: customer_id(&subscription.customer)
                        .ok_or_else(|| malformed("customer"))?,
                    subscription_id: subscription.id.to_string(),
                }
            }
            (EventType::InvoicePaymentFailed, EventObject::Invoice(invoice)) => {
                BillingEvent::PaymentFailed {
                    customer_id: customer_id(&invoice.customer).ok_or_else(|| malformed("customer"))?,
                }
            }
            (
                EventType::CheckoutSessionCompleted
                | EventType::CustomerSubscriptionCreated
                | EventType::CustomerSubscriptionUpdated
                | EventType::CustomerSubscriptionDeleted
                | EventType::InvoicePaymentFailed,
                _,
            ) => return Err(malformed("data.object")),
            _ => BillingEvent::Ignored {
                event_type: name.clone(),
            },
        };

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripe::{CheckoutSession, Invoice, Subscription};

    fn plan_metadata(plan: &str) -> Metadata {
        [("plan".to_string(), plan.to_string())].into()
    }

    #[test]
    fn parses_checkout_completed() {
        let user_id = Uuid::new_v4();
        let session = CheckoutSession {
            client_reference_id: Some(user_id.to_string()),
            customer: Some(Expandable::Id("cus_1".parse().unwrap())),
            subscription: Some(Expandable::Id("sub_1".parse().unwrap())),
            metadata: plan_metadata("pro").into(),
            ..Default::default()
        };

        let event = BillingEvent::from_stripe(
            EventType::CheckoutSessionCompleted,
            EventObject::CheckoutSession(session),
        )
        .unwrap();

        assert_eq!(
            event,
            BillingEvent::CheckoutCompleted {
                user_id: Some(user_id),
                customer_id: Some("cus_1".to_string()),
                subscription_id: Some("sub_1".to_string()),
                plan: Some(Plan::Pro),
            }
        );
    }

    #[test]
    fn checkout_without_reference_has_no_user() {
        let session = CheckoutSession {
            client_reference_id: Some("not-a-uuid".to_string()),
            ..Default::default()
        };

        let event = BillingEvent::from_stripe(
            EventType::CheckoutSessionCompleted,
            EventObject::CheckoutSession(session),
        )
        .unwrap();

        assert!(matches!(
            event,
            BillingEvent::CheckoutCompleted { user_id: None, customer_id: None, plan: None, .. }
        ));
    }

    #[test]
    fn parses_subscription_update() {
        let subscription = Subscription {
            id: "sub_1".parse().unwrap(),
            customer: Expandable::Id("cus_1".parse().unwrap()).into(),
            status: stripe::SubscriptionStatus::PastDue,
            metadata: plan_metadata("team").into(),
            ..Default::default()
        };

        let event = BillingEvent::from_stripe(
            EventType::CustomerSubscriptionUpdated,
            EventObject::Subscription(subscription),
        )
        .unwrap();

        assert_eq!(
            event,
            BillingEvent::SubscriptionChanged {
                customer_id: "cus_1".to_string(),
                subscription_id: "sub_1".to_string(),
                status: SubscriptionStatus::PastDue,
                price_id: None,
                metadata_plan: Some(Plan::Team),
            }
        );
    }

    #[test]
    fn invoice_without_customer_is_malformed() {
        let err = BillingEvent::from_stripe(
            EventType::InvoicePaymentFailed,
            EventObject::Invoice(Invoice::default()),
        )
        .unwrap_err();

        assert_eq!(err.field, "customer");
    }

    #[test]
    fn wrong_object_kind_is_malformed() {
        let err = BillingEvent::from_stripe(
            EventType::CustomerSubscriptionDeleted,
            EventObject::CheckoutSession(CheckoutSession::default()),
        )
        .unwrap_err();

        assert_eq!(err.field, "data.object");
    }

    #[test]
    fn unhandled_types_are_ignored() {
        let event = BillingEvent::from_stripe(
            EventType::ChargeRefunded,
            EventObject::Invoice(Invoice::default()),
        )
        .unwrap();

        assert!(matches!(event, BillingEvent::Ignored { .. }));
    }
}
