//! PostgreSQL implementation of GiftCodeRepository.
//!
//! Redemption is a single conditional UPDATE guarded on `status = 'pending'`
//! so exactly one of any set of concurrent redeemers wins the row.

use crate::domain::entitlement::{BillingCycle, GiftCode, GiftCodeStatus};
use crate::domain::foundation::{DomainError, PlanRef, Timestamp, UserId};
use crate::ports::{GiftCodeRepository, InsertOutcome, RedeemOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the GiftCodeRepository port.
pub struct PostgresGiftCodeRepository {
    pool: PgPool,
}

impl PostgresGiftCodeRepository {
    /// Creates a new PostgresGiftCodeRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a gift code.
#[derive(Debug, sqlx::FromRow)]
struct GiftCodeRow {
    code: String,
    plan_ref: String,
    billing_cycle: String,
    duration_days: i64,
    purchased_by: Uuid,
    redeemed_by: Option<Uuid>,
    status: String,
    external_session_ref: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    redeemed_at: Option<DateTime<Utc>>,
}

impl TryFrom<GiftCodeRow> for GiftCode {
    type Error = DomainError;

    fn try_from(row: GiftCodeRow) -> Result<Self, Self::Error> {
        Ok(GiftCode {
            code: row.code,
            plan_ref: PlanRef::new(row.plan_ref)
                .map_err(|e| DomainError::database(format!("Invalid plan_ref: {}", e)))?,
            billing_cycle: parse_cycle(&row.billing_cycle)?,
            duration_days: row.duration_days,
            purchased_by: UserId::from_uuid(row.purchased_by),
            redeemed_by: row.redeemed_by.map(UserId::from_uuid),
            status: parse_status(&row.status)?,
            external_session_ref: row.external_session_ref,
            expires_at: Timestamp::from_datetime(row.expires_at),
            created_at: Timestamp::from_datetime(row.created_at),
            redeemed_at: row.redeemed_at.map(Timestamp::from_datetime),
        })
    }
}

fn parse_cycle(s: &str) -> Result<BillingCycle, DomainError> {
    BillingCycle::parse(s)
        .map_err(|e| DomainError::database(format!("Invalid billing cycle: {}", e)))
}

fn parse_status(s: &str) -> Result<GiftCodeStatus, DomainError> {
    GiftCodeStatus::parse(s)
        .ok_or_else(|| DomainError::database(format!("Invalid gift code status: {}", s)))
}

const SELECT_COLUMNS: &str = r#"
    SELECT code, plan_ref, billing_cycle, duration_days, purchased_by, redeemed_by,
           status, external_session_ref, expires_at, created_at, redeemed_at
    FROM gift_codes
"#;

#[async_trait]
impl GiftCodeRepository for PostgresGiftCodeRepository {
    async fn insert(&self, code: &GiftCode) -> Result<InsertOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO gift_codes (
                code, plan_ref, billing_cycle, duration_days, purchased_by, redeemed_by,
                status, external_session_ref, expires_at, created_at, redeemed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(&code.code)
        .bind(code.plan_ref.as_str())
        .bind(code.billing_cycle.as_str())
        .bind(code.duration_days)
        .bind(code.purchased_by.as_uuid())
        .bind(code.redeemed_by.map(|id| *id.as_uuid()))
        .bind(code.status.as_str())
        .bind(&code.external_session_ref)
        .bind(code.expires_at.as_datetime())
        .bind(code.created_at.as_datetime())
        .bind(code.redeemed_at.map(|ts| *ts.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert gift code: {}", e)))?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::CodeExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<GiftCode>, DomainError> {
        let row: Option<GiftCodeRow> =
            sqlx::query_as(&format!("{} WHERE code = $1", SELECT_COLUMNS))
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to find gift code: {}", e)))?;

        row.map(GiftCode::try_from).transpose()
    }

    async fn list_by_purchaser(&self, user_id: UserId) -> Result<Vec<GiftCode>, DomainError> {
        let rows: Vec<GiftCodeRow> = sqlx::query_as(&format!(
            "{} WHERE purchased_by = $1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list gift codes: {}", e)))?;

        rows.into_iter().map(GiftCode::try_from).collect()
    }

    async fn mark_redeemed(
        &self,
        code: &str,
        redeemed_by: UserId,
        redeemed_at: Timestamp,
    ) -> Result<RedeemOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE gift_codes SET
                status = 'redeemed',
                redeemed_by = $2,
                redeemed_at = $3
            WHERE code = $1 AND status = 'pending'
            "#,
        )
        .bind(code)
        .bind(redeemed_by.as_uuid())
        .bind(redeemed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to redeem gift code: {}", e)))?;

        if result.rows_affected() == 0 {
            Ok(RedeemOutcome::NotPending)
        } else {
            Ok(RedeemOutcome::Redeemed)
        }
    }

    async fn mark_expired(&self, code: &str) -> Result<(), DomainError> {
        sqlx::query("UPDATE gift_codes SET status = 'expired' WHERE code = $1 AND status = 'pending'")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to expire gift code: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> GiftCodeRow {
        GiftCodeRow {
            code: "K3NP-W8RT-2QZM".to_string(),
            plan_ref: "premium".to_string(),
            billing_cycle: "yearly".to_string(),
            duration_days: 365,
            purchased_by: Uuid::new_v4(),
            redeemed_by: None,
            status: "pending".to_string(),
            external_session_ref: "cs_gift_1".to_string(),
            expires_at: Utc::now(),
            created_at: Utc::now(),
            redeemed_at: None,
        }
    }

    #[test]
    fn row_maps_to_domain_gift_code() {
        let code = GiftCode::try_from(row()).unwrap();
        assert_eq!(code.code, "K3NP-W8RT-2QZM");
        assert_eq!(code.billing_cycle, BillingCycle::Yearly);
        assert_eq!(code.status, GiftCodeStatus::Pending);
        assert_eq!(code.duration_days, 365);
        assert!(code.redeemed_by.is_none());
    }

    #[test]
    fn redeemed_row_carries_redeemer() {
        let mut redeemed = row();
        let redeemer = Uuid::new_v4();
        redeemed.status = "redeemed".to_string();
        redeemed.redeemed_by = Some(redeemer);
        redeemed.redeemed_at = Some(Utc::now());

        let code = GiftCode::try_from(redeemed).unwrap();
        assert_eq!(code.status, GiftCodeStatus::Redeemed);
        assert_eq!(code.redeemed_by, Some(UserId::from_uuid(redeemer)));
        assert!(code.redeemed_at.is_some());
    }

    #[test]
    fn invalid_status_is_rejected() {
        let mut bad = row();
        bad.status = "revoked".to_string();
        assert!(GiftCode::try_from(bad).is_err());
    }

    #[test]
    fn invalid_cycle_is_rejected() {
        let mut bad = row();
        bad.billing_cycle = "weekly".to_string();
        assert!(GiftCode::try_from(bad).is_err());
    }
}
