//! Operation errors for checkout, gifting, and subscription management.

use crate::domain::foundation::ValidationError;
use thiserror::Error;

/// Errors surfaced by entitlement operations.
#[derive(Debug, Error)]
pub enum EntitlementError {
    /// A required piece of configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The payment authority could not be reached or answered with an error.
    #[error("Payment authority unavailable: {0}")]
    GatewayUnavailable(String),

    /// The requested plan is not in the catalog.
    #[error("Unknown plan: {0}")]
    PlanNotFound(String),

    /// The plan exists but is not sold on the requested billing cycle.
    #[error("Plan '{plan}' is not offered {cycle}")]
    CycleUnavailable { plan: String, cycle: String },

    /// The user already owns the course; no session is created.
    #[error("Course already purchased")]
    AlreadyPurchased,

    /// The operation requires an active subscription.
    #[error("Active subscription required")]
    SubscriptionRequired,

    /// Could not mint a unique gift code after bounded retries.
    #[error("Gift code generation exhausted")]
    CodeGenerationExhausted,

    /// No gift code matches the given value.
    #[error("Gift code not found")]
    CodeNotFound,

    /// The gift code's redemption window has elapsed.
    #[error("Gift code expired")]
    CodeExpired,

    /// The gift code was already consumed.
    #[error("Gift code already redeemed")]
    CodeAlreadyRedeemed,

    /// The checkout that paid for the code has not settled.
    #[error("Payment not confirmed")]
    PaymentNotConfirmed,

    /// The payment authority does not know the checkout session.
    #[error("Checkout session not found")]
    SessionNotFound,

    /// The checkout session does not belong to the caller.
    #[error("Session belongs to a different user")]
    SessionOwnerMismatch,

    /// No entitlement record exists for the user.
    #[error("Entitlement record not found")]
    RecordNotFound,

    /// The user has no subscription to act on.
    #[error("No subscription on record")]
    NoSubscription,

    /// Concurrent writers kept invalidating the update.
    #[error("Concurrent update conflict")]
    ConflictRetryExhausted,

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl EntitlementError {
    /// True when retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EntitlementError::GatewayUnavailable(_)
                | EntitlementError::ConflictRetryExhausted
                | EntitlementError::Database(_)
        )
    }
}
