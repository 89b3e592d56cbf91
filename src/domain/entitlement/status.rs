//! Subscription status state machine.
//!
//! Defines the states a subscription moves through as authoritative payment
//! events arrive, and which transitions those events are allowed to cause.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Status of a user's plan subscription.
///
/// Absence of a subscription on the entitlement record represents the
/// "none" state; a brand-new checkout is the only way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid-up subscription within its billing period.
    Active,

    /// A renewal payment failed; access continues until the already-paid
    /// period elapses.
    PastDue,

    /// Cancellation scheduled; remains usable until period end.
    Cancelled,

    /// Subscription ended. Re-entry to Active only via a new checkout,
    /// which replaces the subscription state wholesale.
    Expired,
}

impl SubscriptionStatus {
    /// Returns true if this status grants access within the billing period.
    ///
    /// Callers must additionally check `period_end` (lazy expiry); a stored
    /// Active past its period end grants nothing.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::PastDue | SubscriptionStatus::Cancelled
        )
    }

    /// Stable string form used in storage and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Parses the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From ACTIVE
            (Active, Active) // Renewal
                | (Active, PastDue)
                | (Active, Cancelled)
                | (Active, Expired)
            // From PAST_DUE
                | (PastDue, Active) // Payment recovered
                | (PastDue, Cancelled)
                | (PastDue, Expired)
            // From CANCELLED
                | (Cancelled, Active) // Cancellation revoked remotely
                | (Cancelled, Expired)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Active => vec![Active, PastDue, Cancelled, Expired],
            PastDue => vec![Active, Cancelled, Expired],
            Cancelled => vec![Active, Expired],
            Expired => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_can_renew_to_active() {
        assert!(SubscriptionStatus::Active.can_transition_to(&SubscriptionStatus::Active));
    }

    #[test]
    fn active_can_go_past_due() {
        let result = SubscriptionStatus::Active.transition_to(SubscriptionStatus::PastDue);
        assert_eq!(result, Ok(SubscriptionStatus::PastDue));
    }

    #[test]
    fn past_due_can_recover_to_active() {
        let result = SubscriptionStatus::PastDue.transition_to(SubscriptionStatus::Active);
        assert_eq!(result, Ok(SubscriptionStatus::Active));
    }

    #[test]
    fn cancelled_can_expire() {
        let result = SubscriptionStatus::Cancelled.transition_to(SubscriptionStatus::Expired);
        assert_eq!(result, Ok(SubscriptionStatus::Expired));
    }

    #[test]
    fn expired_is_terminal() {
        assert!(SubscriptionStatus::Expired.is_terminal());
        assert!(!SubscriptionStatus::Expired.can_transition_to(&SubscriptionStatus::Active));
    }

    #[test]
    fn grants_access_matches_grace_policy() {
        assert!(SubscriptionStatus::Active.grants_access());
        assert!(SubscriptionStatus::PastDue.grants_access());
        assert!(SubscriptionStatus::Cancelled.grants_access());
        assert!(!SubscriptionStatus::Expired.grants_access());
    }

    #[test]
    fn string_form_roundtrips() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Expired,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(SubscriptionStatus::parse("trialing"), None);
    }
}
