//! Subscription plans, statuses and the features each plan unlocks.
//!
//! Plans and statuses are stored as lowercase text columns on `users`
//! and converted here with `as_str` / `FromStr`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Plan tier a user subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Basic chat only.
    Starter,
    /// Chat with job context and conversation history.
    Pro,
    /// Everything in Pro plus sharing conversations with other users.
    Team,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Starter, Plan::Pro, Plan::Team];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Starter => "starter",
            Plan::Pro => "pro",
            Plan::Team => "team",
        }
    }

    /// Static plan → feature table.
    pub fn features(&self) -> PlanFeatures {
        match self {
            Plan::Starter => PlanFeatures {
                chat: true,
                history: false,
                job_context: false,
                sharing: false,
            },
            Plan::Pro => PlanFeatures {
                chat: true,
                history: true,
                job_context: true,
                sharing: false,
            },
            Plan::Team => PlanFeatures {
                chat: true,
                history: true,
                job_context: true,
                sharing: true,
            },
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct UnknownValue(pub String);

impl FromStr for Plan {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(Plan::Starter),
            "pro" => Ok(Plan::Pro),
            "team" => Ok(Plan::Team),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// Mirror of the billing provider's subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    None,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    /// Whether this status grants access to paid features.
    pub fn is_entitled(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }

    /// Map a Stripe subscription status onto the mirrored status.
    ///
    /// `incomplete_expired` collapses to `canceled` and `paused` to `unpaid`;
    /// anything unrecognised is treated as `incomplete`.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
            "unpaid" | "paused" => SubscriptionStatus::Unpaid,
            _ => SubscriptionStatus::Incomplete,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SubscriptionStatus::None),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// Feature flags unlocked by a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanFeatures {
    pub chat: bool,
    pub history: bool,
    pub job_context: bool,
    pub sharing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Chat,
    History,
    JobContext,
    Sharing,
}

impl Feature {
    /// Cheapest plan that includes this feature.
    pub fn minimum_plan(&self) -> Plan {
        match self {
            Feature::Chat => Plan::Starter,
            Feature::History | Feature::JobContext => Plan::Pro,
            Feature::Sharing => Plan::Team,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Feature::Chat => "Chat",
            Feature::History => "Conversation history",
            Feature::JobContext => "Job context",
            Feature::Sharing => "Conversation sharing",
        }
    }
}

impl PlanFeatures {
    pub fn allows(&self, feature: Feature) -> bool {
        match feature {
            Feature::Chat => self.chat,
            Feature::History => self.history,
            Feature::JobContext => self.job_context,
            Feature::Sharing => self.sharing,
        }
    }
}

/// A user's effective access: their plan, status, and the features that
/// combination actually grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub plan: Option<Plan>,
    pub status: SubscriptionStatus,
    pub features: PlanFeatures,
}

impl Entitlement {
    /// Without an entitled status no features are granted, whatever the plan.
    pub fn for_user(plan: Option<Plan>, status: SubscriptionStatus) -> Self {
        let features = match plan {
            Some(plan) if status.is_entitled() => plan.features(),
            _ => PlanFeatures::default(),
        };

        Self {
            plan,
            status,
            features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_is_chat_only() {
        let features = Plan::Starter.features();
        assert!(features.chat);
        assert!(!features.history);
        assert!(!features.job_context);
        assert!(!features.sharing);
    }

    #[test]
    fn pro_adds_history_and_job_context() {
        let features = Plan::Pro.features();
        assert!(features.history && features.job_context);
        assert!(!features.sharing);
    }

    #[test]
    fn team_adds_sharing() {
        assert!(Plan::Team.features().sharing);
    }

    #[test]
    fn minimum_plan_allows_its_feature() {
        for feature in [Feature::Chat, Feature::History, Feature::JobContext, Feature::Sharing] {
            assert!(feature.minimum_plan().features().allows(feature), "{feature:?}");
        }
        assert!(!Plan::Pro.features().allows(Feature::Sharing));
    }

    #[test]
    fn plan_text_round_trips() {
        for plan in Plan::ALL {
            assert_eq!(plan.as_str().parse::<Plan>().unwrap(), plan);
        }
        assert!("enterprise".parse::<Plan>().is_err());
    }

    #[test]
    fn inactive_status_grants_nothing() {
        for status in [
            SubscriptionStatus::None,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Incomplete,
        ] {
            let entitlement = Entitlement::for_user(Some(Plan::Team), status);
            assert_eq!(entitlement.features, PlanFeatures::default(), "{status}");
        }
    }

    #[test]
    fn trialing_counts_as_entitled() {
        let entitlement = Entitlement::for_user(Some(Plan::Pro), SubscriptionStatus::Trialing);
        assert!(entitlement.features.history);
    }

    #[test]
    fn provider_statuses_map_onto_mirror() {
        assert_eq!(SubscriptionStatus::from_provider("active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_provider("past_due"), SubscriptionStatus::PastDue);
        assert_eq!(
            SubscriptionStatus::from_provider("incomplete_expired"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(SubscriptionStatus::from_provider("paused"), SubscriptionStatus::Unpaid);
        assert_eq!(
            SubscriptionStatus::from_provider("something_new"),
            SubscriptionStatus::Incomplete
        );
    }
}
