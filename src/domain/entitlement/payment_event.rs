//! Payment authority webhook event types.
//!
//! Structures for parsing notification payloads from the remote payment
//! authority. Only fields the reconciler needs are captured; everything
//! else in the payload is ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A webhook notification envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentNotification {
    /// Unique event identifier (evt_xxx format). Redeliveries reuse it.
    pub id: String,

    /// Event type string, e.g. "checkout.session.completed".
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp the authority created the event. Ordering key for
    /// last-writer-wins reconciliation.
    pub created: i64,

    pub data: NotificationData,

    /// Whether this is a live mode event (vs test mode).
    pub livemode: bool,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationData {
    /// The object that triggered the event, polymorphic by event type.
    pub object: serde_json::Value,
}

impl PaymentNotification {
    /// Classifies the event type into a known variant.
    pub fn kind(&self) -> PaymentEventKind {
        PaymentEventKind::classify(&self.event_type)
    }

    /// Deserializes the data object as the given payload type.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

/// Event types the reconciler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    /// A checkout session finished; payment may or may not have settled.
    CheckoutCompleted,
    /// Subscription attributes changed (status, period, cancellation).
    SubscriptionUpdated,
    /// Subscription removed at the authority. Authoritative expiry.
    SubscriptionDeleted,
    /// A renewal invoice settled.
    InvoicePaid,
    /// A renewal invoice failed to settle.
    InvoicePaymentFailed,
    /// Anything else. Acknowledged without action.
    Unknown,
}

impl PaymentEventKind {
    pub fn classify(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutCompleted,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "invoice.paid" => Self::InvoicePaid,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted => "checkout.session.completed",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::Unknown => "unknown",
        }
    }
}

/// Checkout session object, carried by `checkout.session.completed` and
/// returned by the session fetch API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionObject {
    pub id: String,

    /// "paid", "unpaid", or "no_payment_required".
    pub payment_status: String,

    /// Customer reference, absent on some guest flows.
    #[serde(default)]
    pub customer: Option<String>,

    /// Subscription created by a subscription-mode checkout.
    #[serde(default)]
    pub subscription: Option<String>,

    /// Metadata attached at session creation. The authoritative record of
    /// what the session was for.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SessionObject {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid" || self.payment_status == "no_payment_required"
    }
}

/// Subscription object, carried by subscription lifecycle events and
/// returned by the subscription fetch API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionObject {
    pub id: String,

    pub customer: String,

    /// Remote status string, e.g. "active", "past_due", "canceled".
    pub status: String,

    /// Current billing period boundaries, Unix seconds.
    pub current_period_start: i64,
    pub current_period_end: i64,

    #[serde(default)]
    pub cancel_at_period_end: bool,
}

/// Invoice object, carried by `invoice.paid` and `invoice.payment_failed`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvoiceObject {
    pub id: String,

    #[serde(default)]
    pub customer: Option<String>,

    /// Subscription the invoice bills, absent for one-off invoices.
    #[serde(default)]
    pub subscription: Option<String>,

    /// Period covered by the invoice, Unix seconds.
    pub period_start: i64,
    pub period_end: i64,
}

/// Builder for test notifications.
#[cfg(test)]
pub struct NotificationBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
    livemode: bool,
}

#[cfg(test)]
impl Default for NotificationBuilder {
    fn default() -> Self {
        Self {
            id: "evt_test_123".to_string(),
            event_type: "checkout.session.completed".to_string(),
            created: chrono::Utc::now().timestamp(),
            object: serde_json::json!({}),
            livemode: false,
        }
    }
}

#[cfg(test)]
impl NotificationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn created(mut self, created: i64) -> Self {
        self.created = created;
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn build(self) -> PaymentNotification {
        PaymentNotification {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            data: NotificationData {
                object: self.object,
            },
            livemode: self.livemode,
        }
    }
}
