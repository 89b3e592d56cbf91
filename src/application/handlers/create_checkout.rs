//! Checkout orchestration for plans, courses, and gifts.

use std::sync::Arc;
use tracing::warn;

use crate::domain::entitlement::{
    BillingCycle, CheckoutIntent, EntitlementError, GiftCode, SessionMetadata, SubscriptionStatus,
};
use crate::domain::foundation::{CourseId, PlanRef, Timestamp, UserId};
use crate::ports::{
    CheckoutIntentRepository, CreateSessionRequest, EntitlementRepository, GiftCodeRepository,
    InsertOutcome, PaymentGateway, PlanCatalog, SessionHandle, SessionLineItem, SessionMode,
    UpdateOutcome,
};

/// Attempts at minting a collision-free gift code.
const MAX_CODE_ATTEMPTS: u32 = 10;

/// Attempts before giving up on caching the customer reference.
const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Redirect URLs for hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// What the caller wants to buy.
#[derive(Debug, Clone)]
pub enum CheckoutKind {
    Plan {
        plan_ref: PlanRef,
        billing_cycle: BillingCycle,
    },
    Course {
        course_id: CourseId,
        title: String,
        amount_cents: i64,
        currency: String,
    },
    Gift {
        plan_ref: PlanRef,
        billing_cycle: BillingCycle,
    },
}

/// A created checkout, ready for redirect.
#[derive(Debug, Clone)]
pub struct CheckoutCreated {
    pub session_ref: String,
    /// Hosted payment page URL.
    pub url: String,
    /// The minted code, for gift checkouts.
    pub gift_code: Option<String>,
}

/// Opens hosted checkout sessions against the payment authority.
///
/// The session metadata written here is what the reconciler later reads
/// back; the locally saved intent is best-effort bookkeeping only.
pub struct CreateCheckout {
    entitlements: Arc<dyn EntitlementRepository>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn PlanCatalog>,
    intents: Arc<dyn CheckoutIntentRepository>,
    gift_codes: Arc<dyn GiftCodeRepository>,
    urls: CheckoutUrls,
}

impl CreateCheckout {
    pub fn new(
        entitlements: Arc<dyn EntitlementRepository>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn PlanCatalog>,
        intents: Arc<dyn CheckoutIntentRepository>,
        gift_codes: Arc<dyn GiftCodeRepository>,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            entitlements,
            gateway,
            catalog,
            intents,
            gift_codes,
            urls,
        }
    }

    pub async fn execute(
        &self,
        user_id: UserId,
        email: &str,
        kind: CheckoutKind,
    ) -> Result<CheckoutCreated, EntitlementError> {
        let now = Timestamp::now();

        match kind {
            CheckoutKind::Plan {
                plan_ref,
                billing_cycle,
            } => {
                let price_id = {
                    let plan = self
                        .catalog
                        .find(&plan_ref)
                        .ok_or_else(|| EntitlementError::PlanNotFound(plan_ref.to_string()))?;
                    plan.price_id_for(billing_cycle)
                        .ok_or_else(|| EntitlementError::CycleUnavailable {
                            plan: plan_ref.to_string(),
                            cycle: billing_cycle.as_str().to_string(),
                        })?
                        .to_string()
                };

                let metadata = SessionMetadata::Plan {
                    user_id,
                    plan_ref,
                    billing_cycle,
                };
                let handle = self
                    .open_session(
                        user_id,
                        email,
                        SessionMode::Subscription,
                        SessionLineItem::Price { price_id },
                        &metadata,
                    )
                    .await?;
                self.save_intent(&handle.id, &metadata, now).await;
                Ok(CheckoutCreated {
                    session_ref: handle.id,
                    url: handle.url,
                    gift_code: None,
                })
            }

            CheckoutKind::Course {
                course_id,
                title,
                amount_cents,
                currency,
            } => {
                let record = self
                    .entitlements
                    .find_or_create(user_id)
                    .await
                    .map_err(|e| EntitlementError::Database(e.to_string()))?;
                if record.has_course(&course_id) {
                    // Owned courses are never sold twice; no session opens.
                    return Err(EntitlementError::AlreadyPurchased);
                }

                let metadata = SessionMetadata::Course { user_id, course_id };
                let handle = self
                    .open_session(
                        user_id,
                        email,
                        SessionMode::Payment,
                        SessionLineItem::Amount {
                            name: title,
                            amount_cents,
                            currency,
                        },
                        &metadata,
                    )
                    .await?;
                self.save_intent(&handle.id, &metadata, now).await;
                Ok(CheckoutCreated {
                    session_ref: handle.id,
                    url: handle.url,
                    gift_code: None,
                })
            }

            CheckoutKind::Gift {
                plan_ref,
                billing_cycle,
            } => {
                // Gifts are a subscriber perk; the purchaser must hold an
                // active subscription of their own.
                let record = self
                    .entitlements
                    .find_or_create(user_id)
                    .await
                    .map_err(|e| EntitlementError::Database(e.to_string()))?;
                if record.effective_status(now) != Some(SubscriptionStatus::Active) {
                    return Err(EntitlementError::SubscriptionRequired);
                }

                let (amount_cents, currency, gift_name) = {
                    let plan = self
                        .catalog
                        .find(&plan_ref)
                        .ok_or_else(|| EntitlementError::PlanNotFound(plan_ref.to_string()))?;
                    (
                        plan.amount_cents_for(billing_cycle),
                        plan.currency.clone(),
                        format!("Gift: {} ({})", plan.name, billing_cycle.as_str()),
                    )
                };

                let code = self.mint_unused_code().await?;
                let metadata = SessionMetadata::Gift {
                    user_id,
                    gift_code: code.clone(),
                };
                let handle = self
                    .open_session(
                        user_id,
                        email,
                        SessionMode::Payment,
                        SessionLineItem::Amount {
                            name: gift_name,
                            amount_cents,
                            currency,
                        },
                        &metadata,
                    )
                    .await?;

                let gift = GiftCode::new(
                    code.clone(),
                    plan_ref,
                    billing_cycle,
                    user_id,
                    handle.id.clone(),
                    now,
                );
                match self
                    .gift_codes
                    .insert(&gift)
                    .await
                    .map_err(|e| EntitlementError::Database(e.to_string()))?
                {
                    InsertOutcome::Inserted => {}
                    InsertOutcome::CodeExists => {
                        // Lost a generation race after the session was
                        // opened; the session stays unredeemed.
                        return Err(EntitlementError::CodeGenerationExhausted);
                    }
                }
                self.save_intent(&handle.id, &metadata, now).await;

                Ok(CheckoutCreated {
                    session_ref: handle.id,
                    url: handle.url,
                    gift_code: Some(code),
                })
            }
        }
    }

    async fn open_session(
        &self,
        user_id: UserId,
        email: &str,
        mode: SessionMode,
        line_item: SessionLineItem,
        metadata: &SessionMetadata,
    ) -> Result<SessionHandle, EntitlementError> {
        let customer_ref = self.ensure_customer_ref(user_id, email).await?;
        self.gateway
            .create_checkout_session(CreateSessionRequest {
                customer_ref,
                mode,
                line_item,
                metadata: metadata.to_map(),
                success_url: self.urls.success_url.clone(),
                cancel_url: self.urls.cancel_url.clone(),
            })
            .await
            .map_err(|e| EntitlementError::GatewayUnavailable(e.to_string()))
    }

    /// Returns the cached customer reference, creating it remotely once.
    async fn ensure_customer_ref(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<String, EntitlementError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut record = self
                .entitlements
                .find_or_create(user_id)
                .await
                .map_err(|e| EntitlementError::Database(e.to_string()))?;
            if let Some(existing) = record.external_customer_ref.clone() {
                return Ok(existing);
            }

            let created = self
                .gateway
                .create_customer(user_id, email)
                .await
                .map_err(|e| EntitlementError::GatewayUnavailable(e.to_string()))?;

            let loaded_version = record.version;
            record.cache_customer_ref(created.clone(), Timestamp::now());
            match self
                .entitlements
                .update(&record, loaded_version)
                .await
                .map_err(|e| EntitlementError::Database(e.to_string()))?
            {
                UpdateOutcome::Updated => return Ok(created),
                // Another writer got in; reload in case it set the ref.
                UpdateOutcome::VersionConflict => continue,
            }
        }
        Err(EntitlementError::ConflictRetryExhausted)
    }

    async fn mint_unused_code(&self) -> Result<String, EntitlementError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = GiftCode::generate_code();
            let taken = self
                .gift_codes
                .find_by_code(&candidate)
                .await
                .map_err(|e| EntitlementError::Database(e.to_string()))?
                .is_some();
            if !taken {
                return Ok(candidate);
            }
        }
        Err(EntitlementError::CodeGenerationExhausted)
    }

    /// Best-effort; checkout never fails because bookkeeping did.
    async fn save_intent(&self, session_ref: &str, metadata: &SessionMetadata, now: Timestamp) {
        let intent = CheckoutIntent::from_metadata(session_ref.to_string(), metadata, now);
        if let Err(err) = self.intents.save(&intent).await {
            warn!(
                session_ref = %session_ref,
                error = %err,
                "Failed to record checkout intent"
            );
        }
    }
}
