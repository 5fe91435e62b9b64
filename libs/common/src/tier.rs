//! Plan tiers and the single authority over tier transitions
//!
//! Login, the admin console and the billing webhook never write a tier on
//! their own: they describe what happened as a [`TierEvent`] and persist
//! whatever [`reconcile`] returns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription level gating feature access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Static,
    Basic,
    Premium,
    AdmServer,
}

impl PlanTier {
    /// Every tier, in promotion order
    pub const ALL: [PlanTier; 4] = [
        PlanTier::Static,
        PlanTier::Basic,
        PlanTier::Premium,
        PlanTier::AdmServer,
    ];

    /// Database / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Static => "static",
            PlanTier::Basic => "basic",
            PlanTier::Premium => "premium",
            PlanTier::AdmServer => "adm_server",
        }
    }

    /// Whether premium-only page sections are rendered publicly
    pub fn includes_premium_sections(&self) -> bool {
        matches!(self, PlanTier::Premium)
    }

    /// Whether the tier depends on a paid subscription staying current
    pub fn is_subscription_backed(&self) -> bool {
        matches!(self, PlanTier::Basic | PlanTier::Premium)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown tier name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid plan tier '{0}'. Expected one of: static, basic, premium, adm_server")]
pub struct InvalidPlanTier(pub String);

impl FromStr for PlanTier {
    type Err = InvalidPlanTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlanTier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| InvalidPlanTier(s.to_string()))
    }
}

/// Subscription facts the reconciliation needs about a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    /// Unix timestamp at which the paid period ends, if known
    pub expires_at: Option<i64>,
}

/// Something that may change a user's tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierEvent {
    /// Checked on every successful login at time `now`
    LoginCheck { now: i64 },
    /// A super-admin set the tier explicitly
    AdminOverride(PlanTier),
    /// The billing provider reported a completed checkout
    CheckoutCompleted,
    /// The billing provider reported the subscription as deleted
    SubscriptionCancelled,
}

/// Decide the tier that results from `event`.
///
/// Returns `None` when the tier stays as it is.
pub fn reconcile(
    current: PlanTier,
    subscription: SubscriptionSnapshot,
    event: TierEvent,
) -> Option<PlanTier> {
    let next = match event {
        TierEvent::AdminOverride(tier) => tier,
        TierEvent::CheckoutCompleted => match current {
            PlanTier::AdmServer => current,
            _ => PlanTier::Premium,
        },
        TierEvent::SubscriptionCancelled => match current {
            PlanTier::Premium => PlanTier::Basic,
            _ => current,
        },
        TierEvent::LoginCheck { now } => match subscription.expires_at {
            Some(expires_at) if current.is_subscription_backed() && expires_at < now => {
                PlanTier::Static
            }
            _ => current,
        },
    };

    (next != current).then_some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn expiring(at: i64) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            expires_at: Some(at),
        }
    }

    #[test]
    fn test_parse_and_display_round_trip_names() {
        assert_eq!("adm_server".parse::<PlanTier>(), Ok(PlanTier::AdmServer));
        assert_eq!(PlanTier::Premium.to_string(), "premium");
        assert!("gold".parse::<PlanTier>().is_err());
        assert!("Premium".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&PlanTier::AdmServer).unwrap();
        assert_eq!(json, "\"adm_server\"");
    }

    #[test]
    fn test_login_check_downgrades_expired_paid_tiers() {
        let expired = expiring(NOW - 1);
        let event = TierEvent::LoginCheck { now: NOW };

        assert_eq!(reconcile(PlanTier::Premium, expired, event), Some(PlanTier::Static));
        assert_eq!(reconcile(PlanTier::Basic, expired, event), Some(PlanTier::Static));
        assert_eq!(reconcile(PlanTier::Static, expired, event), None);
        assert_eq!(reconcile(PlanTier::AdmServer, expired, event), None);
    }

    #[test]
    fn test_login_check_keeps_current_or_unknown_expiry() {
        let event = TierEvent::LoginCheck { now: NOW };

        assert_eq!(reconcile(PlanTier::Premium, expiring(NOW + 60), event), None);
        assert_eq!(
            reconcile(PlanTier::Premium, SubscriptionSnapshot::default(), event),
            None
        );
    }

    #[test]
    fn test_checkout_promotes_to_premium_except_admins() {
        let none = SubscriptionSnapshot::default();

        assert_eq!(
            reconcile(PlanTier::Static, none, TierEvent::CheckoutCompleted),
            Some(PlanTier::Premium)
        );
        assert_eq!(
            reconcile(PlanTier::Premium, none, TierEvent::CheckoutCompleted),
            None
        );
        assert_eq!(
            reconcile(PlanTier::AdmServer, none, TierEvent::CheckoutCompleted),
            None
        );
    }

    #[test]
    fn test_cancellation_reverts_premium_to_basic() {
        let none = SubscriptionSnapshot::default();

        assert_eq!(
            reconcile(PlanTier::Premium, none, TierEvent::SubscriptionCancelled),
            Some(PlanTier::Basic)
        );
        assert_eq!(
            reconcile(PlanTier::Static, none, TierEvent::SubscriptionCancelled),
            None
        );
    }

    #[test]
    fn test_admin_override_applies_any_tier() {
        let none = SubscriptionSnapshot::default();

        assert_eq!(
            reconcile(
                PlanTier::Static,
                none,
                TierEvent::AdminOverride(PlanTier::AdmServer)
            ),
            Some(PlanTier::AdmServer)
        );
        assert_eq!(
            reconcile(
                PlanTier::Basic,
                none,
                TierEvent::AdminOverride(PlanTier::Basic)
            ),
            None
        );
    }
}
