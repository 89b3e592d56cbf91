//! Fallback checkout verification.
//!
//! When the user lands back from hosted checkout before the webhook
//! arrives, this path fetches the session directly from the authority and
//! feeds it through the same reconciler the webhook uses. Whichever side
//! runs second becomes a no-op.

use std::sync::Arc;

use crate::domain::entitlement::{
    EntitlementError, SessionMetadata, WebhookError,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::PaymentGateway;

use super::reconcile::{ReconcileOutcome, ReconciliationService};

/// Result of a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The session is paid and its effect is present on the record,
    /// whether this call applied it or the webhook already had.
    Confirmed(ReconcileOutcome),
    /// The session exists but payment has not settled. Nothing changed.
    PaymentPending,
}

/// Verifies a checkout session on behalf of the user who opened it.
pub struct VerifyCheckout {
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<ReconciliationService>,
}

impl VerifyCheckout {
    pub fn new(gateway: Arc<dyn PaymentGateway>, reconciler: Arc<ReconciliationService>) -> Self {
        Self {
            gateway,
            reconciler,
        }
    }

    pub async fn execute(
        &self,
        caller: UserId,
        session_ref: &str,
    ) -> Result<VerifyOutcome, EntitlementError> {
        let session = self
            .gateway
            .get_session(session_ref)
            .await
            .map_err(|e| EntitlementError::GatewayUnavailable(e.to_string()))?
            .ok_or(EntitlementError::SessionNotFound)?;

        // Only the user who opened the session may verify it.
        let metadata = SessionMetadata::parse(&session.metadata)
            .map_err(EntitlementError::Validation)?;
        if metadata.user_id() != caller {
            return Err(EntitlementError::SessionOwnerMismatch);
        }

        if !session.is_paid() {
            return Ok(VerifyOutcome::PaymentPending);
        }

        let outcome = self
            .reconciler
            .apply_paid_session(&session, Timestamp::now())
            .await
            .map_err(webhook_to_entitlement)?;
        Ok(VerifyOutcome::Confirmed(outcome))
    }
}

fn webhook_to_entitlement(err: WebhookError) -> EntitlementError {
    match err {
        WebhookError::Gateway(message) => EntitlementError::GatewayUnavailable(message),
        WebhookError::Database(message) => EntitlementError::Database(message),
        WebhookError::ConflictRetryExhausted => EntitlementError::ConflictRetryExhausted,
        other => EntitlementError::Database(other.to_string()),
    }
}
