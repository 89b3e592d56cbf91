//! Checkout intent tracking and session metadata.
//!
//! Session metadata attached at checkout creation is the authoritative
//! record of what a session was for; the reconciler reads it back from the
//! webhook payload. The locally persisted `CheckoutIntent` is best-effort
//! bookkeeping and never gates fulfillment.

use super::plan::BillingCycle;
use crate::domain::foundation::{CourseId, PlanRef, Timestamp, UserId, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a checkout session purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseKind {
    PlanSubscription,
    Course,
    Gift,
}

impl PurchaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseKind::PlanSubscription => "plan_subscription",
            PurchaseKind::Course => "course",
            PurchaseKind::Gift => "gift",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plan_subscription" => Some(PurchaseKind::PlanSubscription),
            "course" => Some(PurchaseKind::Course),
            "gift" => Some(PurchaseKind::Gift),
            _ => None,
        }
    }
}

/// Typed view of the metadata carried on a remote checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMetadata {
    Plan {
        user_id: UserId,
        plan_ref: PlanRef,
        billing_cycle: BillingCycle,
    },
    Course {
        user_id: UserId,
        course_id: CourseId,
    },
    Gift {
        user_id: UserId,
        gift_code: String,
    },
}

impl SessionMetadata {
    const KEY_KIND: &'static str = "purchase_kind";
    const KEY_USER: &'static str = "user_id";
    const KEY_PLAN: &'static str = "plan_ref";
    const KEY_CYCLE: &'static str = "billing_cycle";
    const KEY_COURSE: &'static str = "course_id";
    const KEY_GIFT_CODE: &'static str = "gift_code";

    /// The user who initiated the checkout.
    pub fn user_id(&self) -> UserId {
        match self {
            SessionMetadata::Plan { user_id, .. }
            | SessionMetadata::Course { user_id, .. }
            | SessionMetadata::Gift { user_id, .. } => *user_id,
        }
    }

    pub fn kind(&self) -> PurchaseKind {
        match self {
            SessionMetadata::Plan { .. } => PurchaseKind::PlanSubscription,
            SessionMetadata::Course { .. } => PurchaseKind::Course,
            SessionMetadata::Gift { .. } => PurchaseKind::Gift,
        }
    }

    /// Serializes to the flat string map the remote session API accepts.
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(Self::KEY_KIND.to_string(), self.kind().as_str().to_string());
        map.insert(Self::KEY_USER.to_string(), self.user_id().to_string());
        match self {
            SessionMetadata::Plan {
                plan_ref,
                billing_cycle,
                ..
            } => {
                map.insert(Self::KEY_PLAN.to_string(), plan_ref.to_string());
                map.insert(
                    Self::KEY_CYCLE.to_string(),
                    billing_cycle.as_str().to_string(),
                );
            }
            SessionMetadata::Course { course_id, .. } => {
                map.insert(Self::KEY_COURSE.to_string(), course_id.to_string());
            }
            SessionMetadata::Gift { gift_code, .. } => {
                map.insert(Self::KEY_GIFT_CODE.to_string(), gift_code.clone());
            }
        }
        map
    }

    /// Parses the metadata map read back from a webhook or session fetch.
    pub fn parse(map: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let kind_str = map
            .get(Self::KEY_KIND)
            .ok_or_else(|| ValidationError::empty_field(Self::KEY_KIND))?;
        let kind = PurchaseKind::parse(kind_str).ok_or_else(|| {
            ValidationError::invalid_format(
                Self::KEY_KIND,
                format!("unknown purchase kind '{}'", kind_str),
            )
        })?;

        let user_id: UserId = map
            .get(Self::KEY_USER)
            .ok_or_else(|| ValidationError::empty_field(Self::KEY_USER))?
            .parse()
            .map_err(|_| ValidationError::invalid_format(Self::KEY_USER, "not a UUID"))?;

        match kind {
            PurchaseKind::PlanSubscription => {
                let plan_ref = map
                    .get(Self::KEY_PLAN)
                    .ok_or_else(|| ValidationError::empty_field(Self::KEY_PLAN))?;
                let plan_ref = PlanRef::try_from(plan_ref.as_str())?;
                let cycle = map
                    .get(Self::KEY_CYCLE)
                    .ok_or_else(|| ValidationError::empty_field(Self::KEY_CYCLE))?;
                let billing_cycle = BillingCycle::parse(cycle)?;
                Ok(SessionMetadata::Plan {
                    user_id,
                    plan_ref,
                    billing_cycle,
                })
            }
            PurchaseKind::Course => {
                let course_id: CourseId = map
                    .get(Self::KEY_COURSE)
                    .ok_or_else(|| ValidationError::empty_field(Self::KEY_COURSE))?
                    .parse()
                    .map_err(|_| {
                        ValidationError::invalid_format(Self::KEY_COURSE, "not a UUID")
                    })?;
                Ok(SessionMetadata::Course { user_id, course_id })
            }
            PurchaseKind::Gift => {
                let gift_code = map
                    .get(Self::KEY_GIFT_CODE)
                    .filter(|code| !code.is_empty())
                    .ok_or_else(|| ValidationError::empty_field(Self::KEY_GIFT_CODE))?;
                Ok(SessionMetadata::Gift {
                    user_id,
                    gift_code: gift_code.clone(),
                })
            }
        }
    }
}

/// Locally persisted record of an initiated checkout.
///
/// Best-effort audit trail. Reconciliation never requires it; losing a row
/// loses nothing but local bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutIntent {
    pub external_session_ref: String,
    pub user_id: UserId,
    pub kind: PurchaseKind,
    pub plan_ref: Option<PlanRef>,
    pub billing_cycle: Option<BillingCycle>,
    pub course_id: Option<CourseId>,
    pub gift_code: Option<String>,
    pub created_at: Timestamp,
}

impl CheckoutIntent {
    /// Builds the intent row matching a session's metadata.
    pub fn from_metadata(
        external_session_ref: String,
        metadata: &SessionMetadata,
        now: Timestamp,
    ) -> Self {
        let mut intent = Self {
            external_session_ref,
            user_id: metadata.user_id(),
            kind: metadata.kind(),
            plan_ref: None,
            billing_cycle: None,
            course_id: None,
            gift_code: None,
            created_at: now,
        };
        match metadata {
            SessionMetadata::Plan {
                plan_ref,
                billing_cycle,
                ..
            } => {
                intent.plan_ref = Some(plan_ref.clone());
                intent.billing_cycle = Some(*billing_cycle);
            }
            SessionMetadata::Course { course_id, .. } => {
                intent.course_id = Some(*course_id);
            }
            SessionMetadata::Gift { gift_code, .. } => {
                intent.gift_code = Some(gift_code.clone());
            }
        }
        intent
    }
}
