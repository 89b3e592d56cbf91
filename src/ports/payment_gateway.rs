//! Port for the remote payment authority.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::entitlement::{SessionObject, SubscriptionObject};
use crate::domain::foundation::UserId;

/// Errors from payment authority calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network-level failure reaching the authority.
    #[error("Network error: {0}")]
    Network(String),

    /// The call exceeded its deadline.
    #[error("Request timed out")]
    Timeout,

    /// The authority throttled us.
    #[error("Rate limited")]
    RateLimited,

    /// The authority rejected the request (4xx).
    #[error("Rejected by payment authority: {0}")]
    Rejected(String),

    /// The authority failed internally (5xx).
    #[error("Payment authority error: {0}")]
    Remote(String),

    /// Response body could not be decoded.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// True when the same call may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_)
                | GatewayError::Timeout
                | GatewayError::RateLimited
                | GatewayError::Remote(_)
        )
    }
}

/// Checkout flavor requested from the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// One-off payment (courses, gifts).
    Payment,
    /// Recurring subscription.
    Subscription,
}

/// What a checkout session charges for.
#[derive(Debug, Clone)]
pub enum SessionLineItem {
    /// A pre-configured recurring price.
    Price { price_id: String },
    /// An ad-hoc one-off charge.
    Amount {
        name: String,
        amount_cents: i64,
        currency: String,
    },
}

/// Request to open a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub customer_ref: String,
    pub mode: SessionMode,
    pub line_item: SessionLineItem,
    /// Attached to the session and echoed back on webhooks. The
    /// authoritative record of what the session is for.
    pub metadata: HashMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// A created checkout session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: String,
    /// Hosted payment page the user is redirected to.
    pub url: String,
}

/// Client port for the payment authority.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a customer, returning its remote reference.
    async fn create_customer(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<String, GatewayError>;

    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionHandle, GatewayError>;

    /// Fetches a checkout session. None if the authority does not know it.
    async fn get_session(&self, session_ref: &str) -> Result<Option<SessionObject>, GatewayError>;

    /// Fetches a subscription. None if the authority does not know it.
    async fn get_subscription(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<SubscriptionObject>, GatewayError>;

    /// Schedules or revokes cancellation at period end.
    async fn set_cancel_at_period_end(
        &self,
        subscription_ref: &str,
        cancel: bool,
    ) -> Result<SubscriptionObject, GatewayError>;

    /// Opens a billing portal session, returning its URL.
    async fn create_portal_session(
        &self,
        customer_ref: &str,
        return_url: &str,
    ) -> Result<String, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_retryable() {
        assert!(GatewayError::Network("reset".into()).is_retryable());
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::RateLimited.is_retryable());
        assert!(GatewayError::Remote("502".into()).is_retryable());
    }

    #[test]
    fn rejections_are_not_retryable() {
        assert!(!GatewayError::Rejected("no such price".into()).is_retryable());
        assert!(!GatewayError::MalformedResponse("bad json".into()).is_retryable());
    }
}
