//! Webhook intake: verify, dedupe, reconcile, journal.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::entitlement::{PaymentNotification, WebhookError, WebhookVerifier};
use crate::domain::foundation::Timestamp;
use crate::ports::{ProcessedEvent, ProcessedEventStore, SaveResult};

use super::reconcile::{ReconcileOutcome, ReconciliationService};

/// Processes raw webhook deliveries end to end.
///
/// Order matters: signature verification first, then the duplicate check
/// against the journal, then reconciliation, then journaling the outcome.
/// A transient failure mid-way leaves no journal entry, so the authority's
/// redelivery gets a clean retry.
pub struct ProcessPaymentWebhook {
    verifier: WebhookVerifier,
    journal: Arc<dyn ProcessedEventStore>,
    reconciler: Arc<ReconciliationService>,
}

impl ProcessPaymentWebhook {
    pub fn new(
        verifier: WebhookVerifier,
        journal: Arc<dyn ProcessedEventStore>,
        reconciler: Arc<ReconciliationService>,
    ) -> Self {
        Self {
            verifier,
            journal,
            reconciler,
        }
    }

    /// Handles one delivery. `Ok` means the event should be acknowledged.
    pub async fn execute(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let event = self.verifier.verify_and_parse(payload, signature_header)?;
        self.process_verified(&event).await
    }

    /// Handles an already-verified notification.
    pub async fn process_verified(
        &self,
        event: &PaymentNotification,
    ) -> Result<ReconcileOutcome, WebhookError> {
        if let Some(seen) = self
            .journal
            .find_by_event_id(&event.id)
            .await
            .map_err(|e| WebhookError::Database(e.to_string()))?
        {
            info!(
                event_id = %event.id,
                event_type = %event.event_type,
                first_outcome = %seen.outcome,
                "Duplicate webhook delivery acknowledged"
            );
            return Ok(ReconcileOutcome::Duplicate);
        }

        let outcome = self.reconciler.apply_notification(event).await?;

        let entry = ProcessedEvent {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            outcome: outcome.as_str().to_string(),
            processed_at: Timestamp::now(),
        };
        match self
            .journal
            .save(&entry)
            .await
            .map_err(|e| WebhookError::Database(e.to_string()))?
        {
            SaveResult::Inserted => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    outcome = %entry.outcome,
                    "Webhook event processed"
                );
                Ok(outcome)
            }
            SaveResult::AlreadyExists => {
                // A concurrent delivery journaled first. The aggregate
                // methods are idempotent, so yield to that writer.
                warn!(
                    event_id = %event.id,
                    "Concurrent webhook delivery lost the journal race"
                );
                Ok(ReconcileOutcome::Duplicate)
            }
        }
    }
}
