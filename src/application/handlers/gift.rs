//! Gift code validation, redemption, and listing.

use std::sync::Arc;
use tracing::info;

use crate::domain::entitlement::{
    BillingCycle, EntitlementError, GiftCode, GiftCodeStatus,
};
use crate::domain::foundation::{PlanRef, Timestamp, UserId};
use crate::ports::{
    EntitlementRepository, GiftCodeRepository, PaymentGateway, PlanCatalog, RedeemOutcome,
    UpdateOutcome,
};

const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Redeemability details shown before redemption.
#[derive(Debug, Clone)]
pub struct GiftCodeView {
    pub code: String,
    pub plan_ref: PlanRef,
    pub plan_name: String,
    pub billing_cycle: BillingCycle,
    pub duration_days: i64,
    pub expires_at: Timestamp,
}

/// Result of a successful redemption.
#[derive(Debug, Clone)]
pub struct GiftRedeemed {
    pub plan_ref: PlanRef,
    pub duration_days: i64,
    /// When the granted or extended subscription now ends.
    pub period_end: Timestamp,
}

/// Gift code operations.
pub struct GiftService {
    gift_codes: Arc<dyn GiftCodeRepository>,
    entitlements: Arc<dyn EntitlementRepository>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn PlanCatalog>,
}

impl GiftService {
    pub fn new(
        gift_codes: Arc<dyn GiftCodeRepository>,
        entitlements: Arc<dyn EntitlementRepository>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn PlanCatalog>,
    ) -> Self {
        Self {
            gift_codes,
            entitlements,
            gateway,
            catalog,
        }
    }

    /// Checks whether a code is redeemable, without touching the payment
    /// authority. Payment settlement is enforced at redemption.
    pub async fn validate(&self, code_input: &str) -> Result<GiftCodeView, EntitlementError> {
        let gift = self.load(code_input).await?;
        match gift.status {
            GiftCodeStatus::Pending => {}
            GiftCodeStatus::Redeemed => return Err(EntitlementError::CodeAlreadyRedeemed),
            GiftCodeStatus::Expired => return Err(EntitlementError::CodeExpired),
        }
        let plan_name = self
            .catalog
            .find(&gift.plan_ref)
            .map(|plan| plan.name.clone())
            .unwrap_or_else(|| gift.plan_ref.to_string());

        Ok(GiftCodeView {
            code: gift.code,
            plan_ref: gift.plan_ref,
            plan_name,
            billing_cycle: gift.billing_cycle,
            duration_days: gift.duration_days,
            expires_at: gift.expires_at,
        })
    }

    /// Redeems a code for the calling user.
    ///
    /// Exactly one concurrent redeemer wins, enforced by the repository's
    /// atomic conditional write. Payment settlement is confirmed against
    /// the authority before the code is consumed. If the entitlement write
    /// fails after the code was consumed, the winner's own retry picks the
    /// transition back up and completes the grant.
    pub async fn redeem(
        &self,
        caller: UserId,
        code_input: &str,
    ) -> Result<GiftRedeemed, EntitlementError> {
        let gift = self.load(code_input).await?;
        match gift.status {
            GiftCodeStatus::Pending => {}
            // An earlier attempt consumed the code but failed before the
            // grant landed; the record-side duplicate guard keeps the
            // grant single-shot.
            GiftCodeStatus::Redeemed if gift.redeemed_by == Some(caller) => {}
            GiftCodeStatus::Redeemed => return Err(EntitlementError::CodeAlreadyRedeemed),
            GiftCodeStatus::Expired => return Err(EntitlementError::CodeExpired),
        }

        let (profiles_allowed, can_download) = self
            .catalog
            .find(&gift.plan_ref)
            .map(|plan| (plan.profiles_allowed, plan.can_download))
            .ok_or_else(|| EntitlementError::PlanNotFound(gift.plan_ref.to_string()))?;

        // The code only has value once its purchase settled.
        let session = self
            .gateway
            .get_session(&gift.external_session_ref)
            .await
            .map_err(|e| EntitlementError::GatewayUnavailable(e.to_string()))?;
        match session {
            Some(session) if session.is_paid() => {}
            _ => return Err(EntitlementError::PaymentNotConfirmed),
        }

        if gift.status == GiftCodeStatus::Pending {
            let now = Timestamp::now();
            match self
                .gift_codes
                .mark_redeemed(&gift.code, caller, now)
                .await
                .map_err(|e| EntitlementError::Database(e.to_string()))?
            {
                RedeemOutcome::Redeemed => {
                    info!(
                        code = %gift.code,
                        plan_ref = %gift.plan_ref,
                        "Gift code redeemed"
                    );
                }
                // Lost a race after the load above; only the winner
                // continues to the grant.
                RedeemOutcome::NotPending => self.ensure_won_by(caller, &gift.code).await?,
            }
        }

        self.apply_to_record(caller, &gift, profiles_allowed, can_download)
            .await
    }

    /// Codes the user has purchased, newest first.
    pub async fn list_purchased(&self, user_id: UserId) -> Result<Vec<GiftCode>, EntitlementError> {
        self.gift_codes
            .list_by_purchaser(user_id)
            .await
            .map_err(|e| EntitlementError::Database(e.to_string()))
    }

    /// Loads a code, applying lazy expiry. Status filtering is left to
    /// the caller.
    async fn load(&self, code_input: &str) -> Result<GiftCode, EntitlementError> {
        let code = GiftCode::normalize_code(code_input)?;
        let gift = self
            .gift_codes
            .find_by_code(&code)
            .await
            .map_err(|e| EntitlementError::Database(e.to_string()))?
            .ok_or(EntitlementError::CodeNotFound)?;

        if gift.is_lapsed(Timestamp::now()) {
            // Lazy expiry; persist the terminal status opportunistically.
            let _ = self.gift_codes.mark_expired(&gift.code).await;
            return Err(EntitlementError::CodeExpired);
        }
        Ok(gift)
    }

    /// Confirms the caller holds the consumed code after losing the
    /// conditional write.
    async fn ensure_won_by(&self, caller: UserId, code: &str) -> Result<(), EntitlementError> {
        let current = self
            .gift_codes
            .find_by_code(code)
            .await
            .map_err(|e| EntitlementError::Database(e.to_string()))?
            .ok_or(EntitlementError::CodeNotFound)?;
        match current.status {
            GiftCodeStatus::Redeemed if current.redeemed_by == Some(caller) => Ok(()),
            GiftCodeStatus::Expired => Err(EntitlementError::CodeExpired),
            _ => Err(EntitlementError::CodeAlreadyRedeemed),
        }
    }

    async fn apply_to_record(
        &self,
        caller: UserId,
        gift: &GiftCode,
        profiles_allowed: u32,
        can_download: bool,
    ) -> Result<GiftRedeemed, EntitlementError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut record = self
                .entitlements
                .find_or_create(caller)
                .await
                .map_err(|e| EntitlementError::Database(e.to_string()))?;
            let loaded_version = record.version;

            let now = Timestamp::now();
            record.apply_gift(
                gift.plan_ref.clone(),
                gift.duration_days,
                gift.code.clone(),
                profiles_allowed,
                can_download,
                now,
            );
            let period_end = record
                .subscription
                .as_ref()
                .map(|sub| sub.period_end)
                .unwrap_or(now);

            match self
                .entitlements
                .update(&record, loaded_version)
                .await
                .map_err(|e| EntitlementError::Database(e.to_string()))?
            {
                UpdateOutcome::Updated => {
                    return Ok(GiftRedeemed {
                        plan_ref: gift.plan_ref.clone(),
                        duration_days: gift.duration_days,
                        period_end,
                    })
                }
                UpdateOutcome::VersionConflict => continue,
            }
        }
        Err(EntitlementError::ConflictRetryExhausted)
    }
}
