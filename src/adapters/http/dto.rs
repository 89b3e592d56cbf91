//! HTTP DTOs for the entitlement API.
//!
//! These types define the JSON request/response structure and form the
//! boundary between HTTP and the application layer. Identifier and slug
//! fields arrive as plain strings and are validated in the handlers.

use serde::{Deserialize, Serialize};

use crate::application::handlers::{
    CheckoutCreated, GiftCodeView, GiftRedeemed, ReconcileOutcome, SubscriptionView, VerifyOutcome,
};
use crate::domain::entitlement::GiftCode;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to open a hosted checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Billing email for the payment authority customer.
    pub email: String,
    /// What is being purchased.
    pub purchase: PurchaseRequest,
}

/// The purchase carried by a checkout request.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseRequest {
    Plan {
        plan_ref: String,
        billing_cycle: String,
    },
    Course {
        course_id: String,
        title: String,
        amount_cents: i64,
        currency: String,
    },
    Gift {
        plan_ref: String,
        billing_cycle: String,
    },
}

/// Request to verify a checkout session after redirect.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyCheckoutRequest {
    /// The session reference from the success redirect.
    pub session_ref: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response for a created checkout session.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    /// Session reference to verify after redirect.
    pub session_ref: String,
    /// Hosted payment page to redirect the user to.
    pub url: String,
    /// The minted gift code, for gift checkouts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift_code: Option<String>,
}

impl From<CheckoutCreated> for CheckoutResponse {
    fn from(created: CheckoutCreated) -> Self {
        Self {
            session_ref: created.session_ref,
            url: created.url,
            gift_code: created.gift_code,
        }
    }
}

/// Response for checkout verification.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    /// "confirmed" once payment settled, "payment_pending" otherwise.
    pub state: String,
    /// Reconciliation outcome when confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl From<VerifyOutcome> for VerifyResponse {
    fn from(outcome: VerifyOutcome) -> Self {
        match outcome {
            VerifyOutcome::Confirmed(reconcile) => Self {
                state: "confirmed".to_string(),
                outcome: Some(reconcile.as_str().to_string()),
            },
            VerifyOutcome::PaymentPending => Self {
                state: "payment_pending".to_string(),
                outcome: None,
            },
        }
    }
}

/// Plan details carried on the subscription view.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    pub plan_ref: String,
    pub name: String,
    pub profiles_allowed: u32,
    pub can_download: bool,
}

/// Response for the subscription status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    /// Effective status, absent when the user never subscribed.
    pub status: Option<String>,
    pub plan: Option<PlanResponse>,
    /// End of the current paid period (ISO 8601).
    pub period_end: Option<String>,
    pub cancel_at_period_end: bool,
    pub is_gift: bool,
    pub has_access: bool,
    /// Courses owned outright.
    pub purchased_courses: Vec<String>,
}

impl From<SubscriptionView> for SubscriptionResponse {
    fn from(view: SubscriptionView) -> Self {
        Self {
            status: view.status.map(|s| s.as_str().to_string()),
            plan: view.plan.map(|plan| PlanResponse {
                plan_ref: plan.plan_ref.to_string(),
                name: plan.name,
                profiles_allowed: plan.profiles_allowed,
                can_download: plan.can_download,
            }),
            period_end: view.period_end.map(|ts| ts.as_datetime().to_rfc3339()),
            cancel_at_period_end: view.cancel_at_period_end,
            is_gift: view.is_gift,
            has_access: view.has_access,
            purchased_courses: view
                .purchased_courses
                .into_iter()
                .map(|id| id.to_string())
                .collect(),
        }
    }
}

/// Response for the billing portal endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PortalResponse {
    /// Hosted portal URL to redirect the user to.
    pub url: String,
}

/// Response for gift code validation.
#[derive(Debug, Clone, Serialize)]
pub struct GiftCodeResponse {
    pub code: String,
    pub plan_ref: String,
    pub plan_name: String,
    pub billing_cycle: String,
    pub duration_days: i64,
    /// When the redemption window closes (ISO 8601).
    pub expires_at: String,
}

impl From<GiftCodeView> for GiftCodeResponse {
    fn from(view: GiftCodeView) -> Self {
        Self {
            code: view.code,
            plan_ref: view.plan_ref.to_string(),
            plan_name: view.plan_name,
            billing_cycle: view.billing_cycle.as_str().to_string(),
            duration_days: view.duration_days,
            expires_at: view.expires_at.as_datetime().to_rfc3339(),
        }
    }
}

/// Response for a successful redemption.
#[derive(Debug, Clone, Serialize)]
pub struct GiftRedeemedResponse {
    pub plan_ref: String,
    pub duration_days: i64,
    /// When the granted access now ends (ISO 8601).
    pub period_end: String,
}

impl From<GiftRedeemed> for GiftRedeemedResponse {
    fn from(redeemed: GiftRedeemed) -> Self {
        Self {
            plan_ref: redeemed.plan_ref.to_string(),
            duration_days: redeemed.duration_days,
            period_end: redeemed.period_end.as_datetime().to_rfc3339(),
        }
    }
}

/// A gift code in the purchaser's list.
#[derive(Debug, Clone, Serialize)]
pub struct PurchasedGiftResponse {
    pub code: String,
    pub plan_ref: String,
    pub billing_cycle: String,
    pub status: String,
    pub expires_at: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<String>,
}

impl From<GiftCode> for PurchasedGiftResponse {
    fn from(gift: GiftCode) -> Self {
        Self {
            code: gift.code,
            plan_ref: gift.plan_ref.to_string(),
            billing_cycle: gift.billing_cycle.as_str().to_string(),
            status: gift.status.as_str().to_string(),
            expires_at: gift.expires_at.as_datetime().to_rfc3339(),
            created_at: gift.created_at.as_datetime().to_rfc3339(),
            redeemed_at: gift.redeemed_at.map(|ts| ts.as_datetime().to_rfc3339()),
        }
    }
}

/// Acknowledgement for a processed webhook delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: String,
}

impl From<ReconcileOutcome> for WebhookAck {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            received: true,
            outcome: outcome.as_str().to_string(),
        }
    }
}

/// Error response for API errors.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}
