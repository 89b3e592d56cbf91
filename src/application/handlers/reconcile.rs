//! Reconciliation of authoritative payment events into entitlement records.
//!
//! Both delivery paths - webhooks and the checkout fallback verifier -
//! converge here, so a session confirmed by webhook first and verified
//! later (or the reverse) produces the same final record.

use std::sync::Arc;
use tracing::warn;

use crate::domain::entitlement::{
    ApplyOutcome, EntitlementRecord, InvoiceObject, PaymentEventKind, PaymentNotification,
    SessionMetadata, SessionObject, SubscriptionObject, SubscriptionStatus, WebhookError,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{EntitlementRepository, PaymentGateway, PlanCatalog, UpdateOutcome};

/// Attempts before giving up on an optimistic write. Exhaustion returns a
/// retryable error so the authority redelivers the event.
const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// What reconciling an event concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The entitlement record changed.
    Applied,
    /// The event's effect was already present.
    Duplicate,
    /// The event was older than an already-applied one. Discarded.
    Stale,
    /// The event does not apply. Acknowledged without effect.
    Ignored,
    /// The event references no known record. Logged and acknowledged.
    Orphaned,
}

impl ReconcileOutcome {
    /// Stable form written to the processed-event journal.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::Duplicate => "duplicate",
            ReconcileOutcome::Stale => "stale",
            ReconcileOutcome::Ignored => "ignored",
            ReconcileOutcome::Orphaned => "orphaned",
        }
    }
}

impl From<ApplyOutcome> for ReconcileOutcome {
    fn from(outcome: ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::Applied => ReconcileOutcome::Applied,
            ApplyOutcome::Duplicate => ReconcileOutcome::Duplicate,
            ApplyOutcome::Stale => ReconcileOutcome::Stale,
            ApplyOutcome::Ignored => ReconcileOutcome::Ignored,
        }
    }
}

/// Maps a remote subscription status string onto the local state machine.
///
/// Unknown statuses return None and the event is acknowledged untouched.
pub fn map_remote_status(status: &str) -> Option<SubscriptionStatus> {
    match status {
        "active" | "trialing" => Some(SubscriptionStatus::Active),
        "past_due" => Some(SubscriptionStatus::PastDue),
        "canceled" => Some(SubscriptionStatus::Cancelled),
        "unpaid" | "incomplete_expired" => Some(SubscriptionStatus::Expired),
        _ => None,
    }
}

/// Applies payment authority state onto entitlement records.
pub struct ReconciliationService {
    entitlements: Arc<dyn EntitlementRepository>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn PlanCatalog>,
}

impl ReconciliationService {
    pub fn new(
        entitlements: Arc<dyn EntitlementRepository>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn PlanCatalog>,
    ) -> Self {
        Self {
            entitlements,
            gateway,
            catalog,
        }
    }

    /// Reconciles one verified notification.
    pub async fn apply_notification(
        &self,
        event: &PaymentNotification,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let event_at = Timestamp::from_unix_secs(event.created);

        match event.kind() {
            PaymentEventKind::CheckoutCompleted => {
                let session: SessionObject = event
                    .payload()
                    .map_err(|e| WebhookError::ParseError(e.to_string()))?;
                if !session.is_paid() {
                    // Payment still settling; a later event confirms it.
                    return Ok(ReconcileOutcome::Ignored);
                }
                self.apply_paid_session(&session, event_at).await
            }

            PaymentEventKind::SubscriptionUpdated => {
                let subscription: SubscriptionObject = event
                    .payload()
                    .map_err(|e| WebhookError::ParseError(e.to_string()))?;
                let Some(target) = map_remote_status(&subscription.status) else {
                    warn!(
                        subscription_ref = %subscription.id,
                        remote_status = %subscription.status,
                        "Unmapped remote subscription status, acknowledging"
                    );
                    return Ok(ReconcileOutcome::Ignored);
                };
                let period_start = Timestamp::from_unix_secs(subscription.current_period_start);
                let period_end = Timestamp::from_unix_secs(subscription.current_period_end);
                let cancel = subscription.cancel_at_period_end;
                self.update_by_subscription_ref(&subscription.id, move |record| {
                    record.apply_subscription_update(
                        target,
                        Some(period_start),
                        Some(period_end),
                        Some(cancel),
                        event_at,
                        Timestamp::now(),
                    )
                })
                .await
            }

            PaymentEventKind::SubscriptionDeleted => {
                let subscription: SubscriptionObject = event
                    .payload()
                    .map_err(|e| WebhookError::ParseError(e.to_string()))?;
                self.update_by_subscription_ref(&subscription.id, move |record| {
                    record.expire_subscription(event_at, Timestamp::now())
                })
                .await
            }

            PaymentEventKind::InvoicePaid => {
                let invoice: InvoiceObject = event
                    .payload()
                    .map_err(|e| WebhookError::ParseError(e.to_string()))?;
                let Some(subscription_ref) = invoice.subscription.clone() else {
                    // One-off invoice; checkout events cover those.
                    return Ok(ReconcileOutcome::Ignored);
                };
                let period_start = Timestamp::from_unix_secs(invoice.period_start);
                let period_end = Timestamp::from_unix_secs(invoice.period_end);
                self.update_by_subscription_ref(&subscription_ref, move |record| {
                    record.renew(period_start, period_end, event_at, Timestamp::now())
                })
                .await
            }

            PaymentEventKind::InvoicePaymentFailed => {
                let invoice: InvoiceObject = event
                    .payload()
                    .map_err(|e| WebhookError::ParseError(e.to_string()))?;
                let Some(subscription_ref) = invoice.subscription.clone() else {
                    return Ok(ReconcileOutcome::Ignored);
                };
                self.update_by_subscription_ref(&subscription_ref, move |record| {
                    record.mark_past_due(event_at, Timestamp::now())
                })
                .await
            }

            PaymentEventKind::Unknown => Ok(ReconcileOutcome::Ignored),
        }
    }

    /// Reconciles a paid checkout session.
    ///
    /// Shared by the webhook path and the fallback verifier; idempotent
    /// under replay from either side.
    pub async fn apply_paid_session(
        &self,
        session: &SessionObject,
        event_at: Timestamp,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let metadata = match SessionMetadata::parse(&session.metadata) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(
                    session_ref = %session.id,
                    error = %err,
                    "Session metadata unusable, dropping event"
                );
                return Ok(ReconcileOutcome::Orphaned);
            }
        };

        match metadata {
            SessionMetadata::Plan {
                user_id,
                plan_ref,
                billing_cycle,
            } => {
                let Some(plan) = self.catalog.find(&plan_ref) else {
                    warn!(
                        session_ref = %session.id,
                        plan_ref = %plan_ref,
                        "Paid session references unknown plan, dropping event"
                    );
                    return Ok(ReconcileOutcome::Orphaned);
                };
                let profiles_allowed = plan.profiles_allowed;
                let can_download = plan.can_download;

                let Some(subscription_ref) = session.subscription.clone() else {
                    return Err(WebhookError::MissingField("subscription"));
                };

                // Prefer the authority's own period boundaries; fall back
                // to cycle-derived bounds if it has not caught up yet.
                let (period_start, period_end) =
                    match self.gateway.get_subscription(&subscription_ref).await {
                        Ok(Some(subscription)) => (
                            Timestamp::from_unix_secs(subscription.current_period_start),
                            Timestamp::from_unix_secs(subscription.current_period_end),
                        ),
                        Ok(None) => (event_at, event_at.add_days(billing_cycle.period_days())),
                        Err(err) if err.is_retryable() => {
                            return Err(WebhookError::Gateway(err.to_string()));
                        }
                        Err(err) => {
                            warn!(
                                subscription_ref = %subscription_ref,
                                error = %err,
                                "Subscription fetch rejected, deriving period from cycle"
                            );
                            (event_at, event_at.add_days(billing_cycle.period_days()))
                        }
                    };

                let customer = session.customer.clone();
                self.update_by_user(user_id, move |record| {
                    let now = Timestamp::now();
                    let cached = customer
                        .clone()
                        .map(|c| record.cache_customer_ref(c, now))
                        .unwrap_or(false);
                    let outcome = record.grant_plan_subscription(
                        plan_ref.clone(),
                        subscription_ref.clone(),
                        period_start,
                        period_end,
                        profiles_allowed,
                        can_download,
                        event_at,
                        now,
                    );
                    if cached && outcome != ApplyOutcome::Applied {
                        // Persist the newly cached customer reference.
                        ApplyOutcome::Applied
                    } else {
                        outcome
                    }
                })
                .await
            }

            SessionMetadata::Course { user_id, course_id } => {
                let session_ref = session.id.clone();
                let customer = session.customer.clone();
                self.update_by_user(user_id, move |record| {
                    let now = Timestamp::now();
                    let cached = customer
                        .clone()
                        .map(|c| record.cache_customer_ref(c, now))
                        .unwrap_or(false);
                    let purchased =
                        record.record_course_purchase(course_id, Some(session_ref.clone()), now);
                    if purchased || cached {
                        ApplyOutcome::Applied
                    } else {
                        ApplyOutcome::Duplicate
                    }
                })
                .await
            }

            // Gift value transfers at redemption, not purchase. The code
            // row already exists; nothing to reconcile here.
            SessionMetadata::Gift { .. } => Ok(ReconcileOutcome::Ignored),
        }
    }

    /// Load-apply-store loop keyed by user, with optimistic retries.
    async fn update_by_user<F>(
        &self,
        user_id: UserId,
        mut apply: F,
    ) -> Result<ReconcileOutcome, WebhookError>
    where
        F: FnMut(&mut EntitlementRecord) -> ApplyOutcome,
    {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut record = self
                .entitlements
                .find_or_create(user_id)
                .await
                .map_err(|e| WebhookError::Database(e.to_string()))?;
            let loaded_version = record.version;

            let outcome = apply(&mut record);
            if outcome != ApplyOutcome::Applied {
                return Ok(outcome.into());
            }

            match self
                .entitlements
                .update(&record, loaded_version)
                .await
                .map_err(|e| WebhookError::Database(e.to_string()))?
            {
                UpdateOutcome::Updated => return Ok(ReconcileOutcome::Applied),
                UpdateOutcome::VersionConflict => continue,
            }
        }
        Err(WebhookError::ConflictRetryExhausted)
    }

    /// Like [`Self::update_by_user`] but keyed by remote subscription
    /// reference. Unknown references are orphaned, not errors.
    async fn update_by_subscription_ref<F>(
        &self,
        subscription_ref: &str,
        mut apply: F,
    ) -> Result<ReconcileOutcome, WebhookError>
    where
        F: FnMut(&mut EntitlementRecord) -> ApplyOutcome,
    {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let Some(mut record) = self
                .entitlements
                .find_by_subscription_ref(subscription_ref)
                .await
                .map_err(|e| WebhookError::Database(e.to_string()))?
            else {
                warn!(
                    subscription_ref = %subscription_ref,
                    "Event references unknown subscription, dropping"
                );
                return Ok(ReconcileOutcome::Orphaned);
            };
            let loaded_version = record.version;

            let outcome = apply(&mut record);
            if outcome != ApplyOutcome::Applied {
                return Ok(outcome.into());
            }

            match self
                .entitlements
                .update(&record, loaded_version)
                .await
                .map_err(|e| WebhookError::Database(e.to_string()))?
            {
                UpdateOutcome::Updated => return Ok(ReconcileOutcome::Applied),
                UpdateOutcome::VersionConflict => continue,
            }
        }
        Err(WebhookError::ConflictRetryExhausted)
    }
}
