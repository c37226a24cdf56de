//! Subscription status mirror.
//!
//! Billing webhooks are mapped by a fixed table onto the `plan` and
//! `subscription_status` columns of the matching user. Events are applied
//! in delivery order (last write wins); nothing is reconciled or retried.
//! An event for a customer or user we don't know is logged and acknowledged
//! rather than failed, so the provider stops redelivering it.

use std::future::Future;

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        billing::BillingEvent,
        plan::{Plan, SubscriptionStatus},
    },
    services::billing_service::StripeClient,
};

/// What to do with the stored plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanChange {
    Keep,
    Set(Plan),
    Clear,
}

/// A status/plan write addressed by billing customer id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub status: SubscriptionStatus,
    pub plan: PlanChange,
    pub subscription_id: Option<String>,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    UnknownCustomer,
    UnknownUser,
    Ignored,
}

/// Persistence for the mirror.
pub trait SubscriptionStore: Send + Sync {
    /// Attach billing ids to a user after checkout. Returns `false` if the
    /// user does not exist.
    fn link_customer(
        &self,
        user_id: Uuid,
        customer_id: Option<&str>,
        change: &SubscriptionChange,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Apply a change to whichever user owns `customer_id`. Returns `false`
    /// if no user has that customer id.
    fn update_by_customer(
        &self,
        customer_id: &str,
        change: &SubscriptionChange,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

/// PostgreSQL-backed store writing to the `users` table.
pub struct PgSubscriptionStore<'a> {
    pool: &'a DbPool,
}

impl<'a> PgSubscriptionStore<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }
}

fn plan_columns(plan: PlanChange) -> (bool, Option<&'static str>) {
    match plan {
        PlanChange::Keep => (false, None),
        PlanChange::Set(plan) => (true, Some(plan.as_str())),
        PlanChange::Clear => (true, None),
    }
}

impl SubscriptionStore for PgSubscriptionStore<'_> {
    async fn link_customer(
        &self,
        user_id: Uuid,
        customer_id: Option<&str>,
        change: &SubscriptionChange,
    ) -> Result<bool, sqlx::Error> {
        let (replace_plan, plan) = plan_columns(change.plan);

        let result = sqlx::query(
            r#"
            UPDATE users
            SET stripe_customer_id = COALESCE($2, stripe_customer_id),
                stripe_subscription_id = COALESCE($3, stripe_subscription_id),
                plan = CASE WHEN $4 THEN $5 ELSE plan END,
                subscription_status = $6,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .bind(change.subscription_id.as_deref())
        .bind(replace_plan)
        .bind(plan)
        .bind(change.status.as_str())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_by_customer(
        &self,
        customer_id: &str,
        change: &SubscriptionChange,
    ) -> Result<bool, sqlx::Error> {
        let (replace_plan, plan) = plan_columns(change.plan);

        let result = sqlx::query(
            r#"
            UPDATE users
            SET stripe_subscription_id = COALESCE($2, stripe_subscription_id),
                plan = CASE WHEN $3 THEN $4 ELSE plan END,
                subscription_status = $5,
                updated_at = NOW()
            WHERE stripe_customer_id = $1
            "#,
        )
        .bind(customer_id)
        .bind(change.subscription_id.as_deref())
        .bind(replace_plan)
        .bind(plan)
        .bind(change.status.as_str())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Apply one parsed billing event to the store.
///
/// `stripe` resolves price ids to plans for subscription updates.
pub async fn apply_event<S: SubscriptionStore>(
    store: &S,
    stripe: &StripeClient,
    event: BillingEvent,
) -> Result<EventOutcome, AppError> {
    match event {
        BillingEvent::CheckoutCompleted {
            user_id,
            customer_id,
            subscription_id,
            plan,
        } => {
            let Some(user_id) = user_id else {
                tracing::warn!("Checkout completed without a valid client_reference_id");
                return Ok(EventOutcome::UnknownUser);
            };

            let change = SubscriptionChange {
                status: SubscriptionStatus::Active,
                plan: plan.map_or(PlanChange::Keep, PlanChange::Set),
                subscription_id,
            };

            if store.link_customer(user_id, customer_id.as_deref(), &change).await? {
                tracing::info!("Linked billing customer {:?} to user {}", customer_id, user_id);
                Ok(EventOutcome::Applied)
            } else {
                tracing::warn!("Checkout completed for unknown user {}", user_id);
                Ok(EventOutcome::UnknownUser)
            }
        }
        BillingEvent::SubscriptionChanged {
            customer_id,
            subscription_id,
            status,
            price_id,
            metadata_plan,
        } => {
            let plan = price_id
                .as_deref()
                .and_then(|price| stripe.plan_for_price(price))
                .or(metadata_plan);

            let change = SubscriptionChange {
                status,
                plan: plan.map_or(PlanChange::Keep, PlanChange::Set),
                subscription_id: Some(subscription_id),
            };

            update_customer(store, &customer_id, change).await
        }
        BillingEvent::SubscriptionDeleted { customer_id, .. } => {
            let change = SubscriptionChange {
                status: SubscriptionStatus::Canceled,
                plan: PlanChange::Clear,
                subscription_id: None,
            };

            update_customer(store, &customer_id, change).await
        }
        BillingEvent::PaymentFailed { customer_id } => {
            let change = SubscriptionChange {
                status: SubscriptionStatus::PastDue,
                plan: PlanChange::Keep,
                subscription_id: None,
            };

            update_customer(store, &customer_id, change).await
        }
        BillingEvent::Ignored { event_type } => {
            tracing::debug!("Ignoring billing event {}", event_type);
            Ok(EventOutcome::Ignored)
        }
    }
}

async fn update_customer<S: SubscriptionStore>(
    store: &S,
    customer_id: &str,
    change: SubscriptionChange,
) -> Result<EventOutcome, AppError> {
    if store.update_by_customer(customer_id, &change).await? {
        tracing::info!(
            "Customer {} subscription now {} (plan {:?})",
            customer_id,
            change.status,
            change.plan
        );
        Ok(EventOutcome::Applied)
    } else {
        tracing::warn!("Billing event for unknown customer {}", customer_id);
        Ok(EventOutcome::UnknownCustomer)
    }
}
