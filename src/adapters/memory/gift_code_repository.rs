//! In-memory gift code repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::entitlement::{GiftCode, GiftCodeStatus};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{GiftCodeRepository, InsertOutcome, RedeemOutcome};

/// Gift code repository backed by a mutex-guarded map.
///
/// `mark_redeemed` checks and flips status under one lock acquisition,
/// matching the single conditional UPDATE of the postgres adapter.
#[derive(Default)]
pub struct InMemoryGiftCodeRepository {
    codes: Mutex<HashMap<String, GiftCode>>,
}

impl InMemoryGiftCodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GiftCodeRepository for InMemoryGiftCodeRepository {
    async fn insert(&self, code: &GiftCode) -> Result<InsertOutcome, DomainError> {
        let mut codes = self.codes.lock().unwrap();
        if codes.contains_key(&code.code) {
            return Ok(InsertOutcome::CodeExists);
        }
        codes.insert(code.code.clone(), code.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<GiftCode>, DomainError> {
        let codes = self.codes.lock().unwrap();
        Ok(codes.get(code).cloned())
    }

    async fn list_by_purchaser(&self, user_id: UserId) -> Result<Vec<GiftCode>, DomainError> {
        let codes = self.codes.lock().unwrap();
        let mut owned: Vec<GiftCode> = codes
            .values()
            .filter(|code| code.purchased_by == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn mark_redeemed(
        &self,
        code: &str,
        redeemed_by: UserId,
        redeemed_at: Timestamp,
    ) -> Result<RedeemOutcome, DomainError> {
        let mut codes = self.codes.lock().unwrap();
        match codes.get_mut(code) {
            Some(stored) if stored.status == GiftCodeStatus::Pending => {
                stored.status = GiftCodeStatus::Redeemed;
                stored.redeemed_by = Some(redeemed_by);
                stored.redeemed_at = Some(redeemed_at);
                Ok(RedeemOutcome::Redeemed)
            }
            Some(_) => Ok(RedeemOutcome::NotPending),
            None => Ok(RedeemOutcome::NotPending),
        }
    }

    async fn mark_expired(&self, code: &str) -> Result<(), DomainError> {
        let mut codes = self.codes.lock().unwrap();
        if let Some(stored) = codes.get_mut(code) {
            if stored.status == GiftCodeStatus::Pending {
                stored.status = GiftCodeStatus::Expired;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entitlement::BillingCycle;
    use crate::domain::foundation::PlanRef;

    fn sample_code(code: &str, purchaser: UserId) -> GiftCode {
        GiftCode::new(
            code.to_string(),
            PlanRef::try_from("premium").unwrap(),
            BillingCycle::Monthly,
            purchaser,
            "cs_gift".to_string(),
            Timestamp::now(),
        )
    }

    #[tokio::test]
    async fn insert_detects_collision() {
        let repo = InMemoryGiftCodeRepository::new();
        let code = sample_code("AAAA-BBBB-CCCC", UserId::new());

        assert_eq!(repo.insert(&code).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(repo.insert(&code).await.unwrap(), InsertOutcome::CodeExists);
    }

    #[tokio::test]
    async fn mark_redeemed_flips_pending_exactly_once() {
        let repo = InMemoryGiftCodeRepository::new();
        let code = sample_code("AAAA-BBBB-CCCC", UserId::new());
        repo.insert(&code).await.unwrap();

        let winner = UserId::new();
        let now = Timestamp::now();
        assert_eq!(
            repo.mark_redeemed("AAAA-BBBB-CCCC", winner, now).await.unwrap(),
            RedeemOutcome::Redeemed
        );
        assert_eq!(
            repo.mark_redeemed("AAAA-BBBB-CCCC", UserId::new(), now)
                .await
                .unwrap(),
            RedeemOutcome::NotPending
        );

        let stored = repo.find_by_code("AAAA-BBBB-CCCC").await.unwrap().unwrap();
        assert_eq!(stored.status, GiftCodeStatus::Redeemed);
        assert_eq!(stored.redeemed_by, Some(winner));
    }

    #[tokio::test]
    async fn list_by_purchaser_filters_and_orders() {
        let repo = InMemoryGiftCodeRepository::new();
        let buyer = UserId::new();
        repo.insert(&sample_code("AAAA-BBBB-CCCC", buyer)).await.unwrap();
        repo.insert(&sample_code("DDDD-EEEE-FFFF", buyer)).await.unwrap();
        repo.insert(&sample_code("GGGG-HHHH-JJJJ", UserId::new()))
            .await
            .unwrap();

        let owned = repo.list_by_purchaser(buyer).await.unwrap();
        assert_eq!(owned.len(), 2);
    }

    #[tokio::test]
    async fn mark_expired_only_touches_pending() {
        let repo = InMemoryGiftCodeRepository::new();
        let code = sample_code("AAAA-BBBB-CCCC", UserId::new());
        repo.insert(&code).await.unwrap();
        repo.mark_redeemed("AAAA-BBBB-CCCC", UserId::new(), Timestamp::now())
            .await
            .unwrap();

        repo.mark_expired("AAAA-BBBB-CCCC").await.unwrap();
        let stored = repo.find_by_code("AAAA-BBBB-CCCC").await.unwrap().unwrap();
        assert_eq!(stored.status, GiftCodeStatus::Redeemed);
    }
}
