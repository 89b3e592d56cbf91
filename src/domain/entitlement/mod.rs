//! Entitlement domain - subscriptions, course purchases, and gift codes.
//!
//! The aggregate root is [`EntitlementRecord`], one per user. State changes
//! flow in from the payment authority through the webhook reconciler and
//! the checkout fallback verifier; both paths converge on the same
//! idempotent aggregate methods.

mod checkout_intent;
mod errors;
mod gift_code;
mod payment_event;
mod plan;
mod record;
mod status;
mod webhook_errors;
mod webhook_verifier;

pub use checkout_intent::{CheckoutIntent, PurchaseKind, SessionMetadata};
pub use errors::EntitlementError;
pub use gift_code::{GiftCode, GiftCodeStatus, CODE_VALIDITY_DAYS};
pub use payment_event::{
    InvoiceObject, NotificationData, PaymentEventKind, PaymentNotification, SessionObject,
    SubscriptionObject,
};
pub use plan::{BillingCycle, Plan, PlanSummary};
pub use record::{ApplyOutcome, CoursePurchase, EntitlementRecord, SubscriptionState};
pub use status::SubscriptionStatus;
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{SignatureHeader, WebhookVerifier};

#[cfg(test)]
pub use payment_event::NotificationBuilder;
#[cfg(test)]
pub use webhook_verifier::compute_test_signature;
