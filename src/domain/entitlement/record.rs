//! Entitlement record aggregate.
//!
//! One record per user, tracking the plan subscription, individually
//! purchased courses, and the cached payment-authority customer reference.
//! All mutation paths are idempotent and tolerate out-of-order delivery so
//! the reconciliation pipeline can replay events safely.

use super::status::SubscriptionStatus;
use crate::domain::foundation::{CourseId, PlanRef, StateMachine, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Result of applying an authoritative payment event to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The record changed.
    Applied,
    /// The event was already reflected in the record. Safe to acknowledge.
    Duplicate,
    /// The event carries an older remote timestamp than one already
    /// applied. Discarded, never merged.
    Stale,
    /// The event does not apply to the record's current state. Safe to
    /// acknowledge.
    Ignored,
}

/// Current subscription state carried on the entitlement record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub plan_ref: PlanRef,
    pub status: SubscriptionStatus,
    /// Remote subscription identifier. None for gift-granted subscriptions,
    /// which have no remote counterpart.
    pub external_subscription_ref: Option<String>,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub profiles_allowed: u32,
    pub can_download: bool,
    pub cancel_at_period_end: bool,
    pub is_gift: bool,
    pub gift_code_used: Option<String>,
    /// Remote timestamp of the newest event applied to this subscription.
    /// Events older than this are discarded (last-writer-wins).
    pub last_event_at: Timestamp,
}

/// An individually purchased course. Permanent once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoursePurchase {
    pub course_id: CourseId,
    pub purchased_at: Timestamp,
    /// Checkout session that paid for the course, for audit.
    pub external_session_ref: Option<String>,
}

/// Per-user entitlement aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub user_id: UserId,
    /// Cached payment-authority customer reference. Created once per user
    /// and reused for every later checkout.
    pub external_customer_ref: Option<String>,
    pub subscription: Option<SubscriptionState>,
    pub purchased_courses: Vec<CoursePurchase>,
    /// Optimistic concurrency version, incremented on every persisted write.
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl EntitlementRecord {
    /// Creates an empty record for a user with no entitlements.
    pub fn new(user_id: UserId) -> Self {
        let now = Timestamp::now();
        Self {
            user_id,
            external_customer_ref: None,
            subscription: None,
            purchased_courses: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Subscription status as of `now`, applying lazy expiry.
    ///
    /// A stored Active, PastDue, or Cancelled subscription whose paid
    /// period has elapsed reads as Expired without any background sweep.
    pub fn effective_status(&self, now: Timestamp) -> Option<SubscriptionStatus> {
        self.subscription.as_ref().map(|sub| {
            if sub.status.grants_access() && now.is_after(&sub.period_end) {
                SubscriptionStatus::Expired
            } else {
                sub.status
            }
        })
    }

    /// Whether the user holds subscription access at `now`.
    pub fn has_access(&self, now: Timestamp) -> bool {
        matches!(
            self.effective_status(now),
            Some(status) if status.grants_access()
        )
    }

    /// Whether the user owns the given course outright.
    pub fn has_course(&self, course_id: &CourseId) -> bool {
        self.purchased_courses
            .iter()
            .any(|purchase| purchase.course_id == *course_id)
    }

    /// Records a course purchase. Returns false if already owned; a course
    /// is bought at most once and never repeated.
    pub fn record_course_purchase(
        &mut self,
        course_id: CourseId,
        external_session_ref: Option<String>,
        now: Timestamp,
    ) -> bool {
        if self.has_course(&course_id) {
            return false;
        }
        self.purchased_courses.push(CoursePurchase {
            course_id,
            purchased_at: now,
            external_session_ref,
        });
        self.touch(now);
        true
    }

    /// Caches the remote customer reference if not already set.
    ///
    /// The reference is created once per user; a second checkout must not
    /// replace it.
    pub fn cache_customer_ref(&mut self, customer_ref: String, now: Timestamp) -> bool {
        if self.external_customer_ref.is_some() {
            return false;
        }
        self.external_customer_ref = Some(customer_ref);
        self.touch(now);
        true
    }

    /// Grants a plan subscription from a confirmed checkout.
    ///
    /// Replaces any prior subscription state wholesale. Detects redelivery
    /// of the same grant by the remote subscription reference.
    #[allow(clippy::too_many_arguments)]
    pub fn grant_plan_subscription(
        &mut self,
        plan_ref: PlanRef,
        external_subscription_ref: String,
        period_start: Timestamp,
        period_end: Timestamp,
        profiles_allowed: u32,
        can_download: bool,
        event_at: Timestamp,
        now: Timestamp,
    ) -> ApplyOutcome {
        if let Some(sub) = &self.subscription {
            let same_ref = sub.external_subscription_ref.as_deref()
                == Some(external_subscription_ref.as_str());
            if same_ref && sub.status == SubscriptionStatus::Active && !sub.period_end.is_before(&period_end)
            {
                return ApplyOutcome::Duplicate;
            }
        }

        self.subscription = Some(SubscriptionState {
            plan_ref,
            status: SubscriptionStatus::Active,
            external_subscription_ref: Some(external_subscription_ref),
            period_start,
            period_end,
            profiles_allowed,
            can_download,
            cancel_at_period_end: false,
            is_gift: false,
            gift_code_used: None,
            last_event_at: event_at,
        });
        self.touch(now);
        ApplyOutcome::Applied
    }

    /// Applies an authoritative status update from the payment authority.
    ///
    /// Events older than the last applied one are discarded. Transitions
    /// the status machine forbids are ignored and acknowledged.
    pub fn apply_subscription_update(
        &mut self,
        target: SubscriptionStatus,
        period_start: Option<Timestamp>,
        period_end: Option<Timestamp>,
        cancel_at_period_end: Option<bool>,
        event_at: Timestamp,
        now: Timestamp,
    ) -> ApplyOutcome {
        let Some(sub) = self.subscription.as_mut() else {
            return ApplyOutcome::Ignored;
        };

        if event_at.is_before(&sub.last_event_at) {
            return ApplyOutcome::Stale;
        }

        let unchanged = sub.status == target
            && period_start.map_or(true, |start| start == sub.period_start)
            && period_end.map_or(true, |end| end == sub.period_end)
            && cancel_at_period_end.map_or(true, |cape| cape == sub.cancel_at_period_end);
        if unchanged {
            sub.last_event_at = event_at;
            return ApplyOutcome::Duplicate;
        }

        if sub.status != target && !sub.status.can_transition_to(&target) {
            return ApplyOutcome::Ignored;
        }

        sub.status = target;
        if let Some(start) = period_start {
            sub.period_start = start;
        }
        if let Some(end) = period_end {
            sub.period_end = end;
        }
        if let Some(cape) = cancel_at_period_end {
            sub.cancel_at_period_end = cape;
        }
        sub.last_event_at = event_at;
        self.touch(now);
        ApplyOutcome::Applied
    }

    /// Marks the subscription past due after a failed renewal payment.
    ///
    /// The period end is left untouched; the user keeps access for the
    /// remainder of the already-paid period.
    pub fn mark_past_due(&mut self, event_at: Timestamp, now: Timestamp) -> ApplyOutcome {
        self.apply_subscription_update(
            SubscriptionStatus::PastDue,
            None,
            None,
            None,
            event_at,
            now,
        )
    }

    /// Renews the subscription for a fresh paid period.
    ///
    /// Valid from Active, PastDue, or Cancelled; an expired subscription
    /// cannot be renewed, only replaced by a new checkout.
    pub fn renew(
        &mut self,
        period_start: Timestamp,
        period_end: Timestamp,
        event_at: Timestamp,
        now: Timestamp,
    ) -> ApplyOutcome {
        self.apply_subscription_update(
            SubscriptionStatus::Active,
            Some(period_start),
            Some(period_end),
            None,
            event_at,
            now,
        )
    }

    /// Ends the subscription. Plan reference is kept for display history.
    pub fn expire_subscription(&mut self, event_at: Timestamp, now: Timestamp) -> ApplyOutcome {
        self.apply_subscription_update(
            SubscriptionStatus::Expired,
            None,
            None,
            Some(false),
            event_at,
            now,
        )
    }

    /// Records a remotely scheduled or revoked cancellation.
    pub fn set_cancel_at_period_end(
        &mut self,
        cancel: bool,
        event_at: Timestamp,
        now: Timestamp,
    ) -> ApplyOutcome {
        let target = if cancel {
            SubscriptionStatus::Cancelled
        } else {
            SubscriptionStatus::Active
        };
        self.apply_subscription_update(target, None, None, Some(cancel), event_at, now)
    }

    /// Grants subscription time from a redeemed gift code.
    ///
    /// If a subscription is currently active the gift extends from its
    /// period end; otherwise the gift starts a fresh period from `now`.
    /// Gift subscriptions carry no remote reference and never auto-renew.
    pub fn apply_gift(
        &mut self,
        plan_ref: PlanRef,
        duration_days: i64,
        code: String,
        profiles_allowed: u32,
        can_download: bool,
        now: Timestamp,
    ) -> ApplyOutcome {
        if let Some(sub) = &self.subscription {
            // A retried redemption of the same code must not extend twice.
            if sub.is_gift && sub.gift_code_used.as_deref() == Some(code.as_str()) {
                return ApplyOutcome::Duplicate;
            }
        }
        let base = match (&self.subscription, self.has_access(now)) {
            (Some(sub), true) => sub.period_end,
            _ => now,
        };
        let period_end = base.add_days(duration_days);

        self.subscription = Some(SubscriptionState {
            plan_ref,
            status: SubscriptionStatus::Active,
            external_subscription_ref: None,
            period_start: now,
            period_end,
            profiles_allowed,
            can_download,
            cancel_at_period_end: false,
            is_gift: true,
            gift_code_used: Some(code),
            last_event_at: now,
        });
        self.touch(now);
        ApplyOutcome::Applied
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
    }
}
