//! Subscription views, cancellation, and billing portal access.

use std::sync::Arc;
use tracing::info;

use crate::domain::entitlement::{
    EntitlementError, PlanSummary, SubscriptionStatus,
};
use crate::domain::foundation::{CourseId, Timestamp, UserId};
use crate::ports::{EntitlementRepository, PaymentGateway, PlanCatalog, UpdateOutcome};

const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Read model of a user's entitlements, with lazy expiry applied.
#[derive(Debug, Clone)]
pub struct SubscriptionView {
    /// Effective status as of now; None when no subscription exists.
    pub status: Option<SubscriptionStatus>,
    pub plan: Option<PlanSummary>,
    pub period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub is_gift: bool,
    pub has_access: bool,
    pub purchased_courses: Vec<CourseId>,
}

/// Subscription management operations.
pub struct SubscriptionService {
    entitlements: Arc<dyn EntitlementRepository>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn PlanCatalog>,
    portal_return_url: String,
}

impl SubscriptionService {
    pub fn new(
        entitlements: Arc<dyn EntitlementRepository>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn PlanCatalog>,
        portal_return_url: String,
    ) -> Self {
        Self {
            entitlements,
            gateway,
            catalog,
            portal_return_url,
        }
    }

    /// Current entitlements for a user. Never writes; expiry is applied
    /// at read time.
    pub async fn get_status(&self, user_id: UserId) -> Result<SubscriptionView, EntitlementError> {
        let record = self
            .entitlements
            .find_by_user(user_id)
            .await
            .map_err(|e| EntitlementError::Database(e.to_string()))?;

        let Some(record) = record else {
            return Ok(SubscriptionView {
                status: None,
                plan: None,
                period_end: None,
                cancel_at_period_end: false,
                is_gift: false,
                has_access: false,
                purchased_courses: Vec::new(),
            });
        };

        let now = Timestamp::now();
        let status = record.effective_status(now);
        let plan = record
            .subscription
            .as_ref()
            .and_then(|sub| self.catalog.find(&sub.plan_ref))
            .map(PlanSummary::from);

        Ok(SubscriptionView {
            status,
            plan,
            period_end: record.subscription.as_ref().map(|sub| sub.period_end),
            cancel_at_period_end: record
                .subscription
                .as_ref()
                .map(|sub| sub.cancel_at_period_end)
                .unwrap_or(false),
            is_gift: record
                .subscription
                .as_ref()
                .map(|sub| sub.is_gift)
                .unwrap_or(false),
            has_access: record.has_access(now),
            purchased_courses: record
                .purchased_courses
                .iter()
                .map(|purchase| purchase.course_id)
                .collect(),
        })
    }

    /// Schedules cancellation at period end, remotely first, then
    /// mirrored locally. Access continues until the paid period elapses.
    pub async fn cancel(&self, user_id: UserId) -> Result<SubscriptionView, EntitlementError> {
        let record = self
            .entitlements
            .find_by_user(user_id)
            .await
            .map_err(|e| EntitlementError::Database(e.to_string()))?
            .ok_or(EntitlementError::RecordNotFound)?;

        let subscription_ref = record
            .subscription
            .as_ref()
            .and_then(|sub| sub.external_subscription_ref.clone())
            // Gift subscriptions have no remote side and simply run out.
            .ok_or(EntitlementError::NoSubscription)?;

        let remote = self
            .gateway
            .set_cancel_at_period_end(&subscription_ref, true)
            .await
            .map_err(|e| EntitlementError::GatewayUnavailable(e.to_string()))?;

        info!(
            subscription_ref = %subscription_ref,
            "Cancellation scheduled at period end"
        );

        // Mirror locally; the webhook will confirm with the same state.
        let event_at = Timestamp::now();
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut record = self
                .entitlements
                .find_by_user(user_id)
                .await
                .map_err(|e| EntitlementError::Database(e.to_string()))?
                .ok_or(EntitlementError::RecordNotFound)?;
            let loaded_version = record.version;
            record.set_cancel_at_period_end(remote.cancel_at_period_end, event_at, event_at);

            match self
                .entitlements
                .update(&record, loaded_version)
                .await
                .map_err(|e| EntitlementError::Database(e.to_string()))?
            {
                UpdateOutcome::Updated => return self.get_status(user_id).await,
                UpdateOutcome::VersionConflict => continue,
            }
        }
        Err(EntitlementError::ConflictRetryExhausted)
    }

    /// Opens a billing portal session for invoice and payment-method
    /// management, returning its URL.
    pub async fn billing_portal(&self, user_id: UserId) -> Result<String, EntitlementError> {
        let record = self
            .entitlements
            .find_by_user(user_id)
            .await
            .map_err(|e| EntitlementError::Database(e.to_string()))?
            .ok_or(EntitlementError::RecordNotFound)?;
        let customer_ref = record
            .external_customer_ref
            .ok_or(EntitlementError::NoSubscription)?;

        self.gateway
            .create_portal_session(&customer_ref, &self.portal_return_url)
            .await
            .map_err(|e| EntitlementError::GatewayUnavailable(e.to_string()))
    }
}
