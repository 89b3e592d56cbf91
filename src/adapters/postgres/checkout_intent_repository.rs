//! PostgreSQL implementation of CheckoutIntentRepository.
//!
//! Intents are audit rows keyed by the remote session reference. Saves are
//! idempotent; a replayed save of the same session is a no-op.

use crate::domain::entitlement::{BillingCycle, CheckoutIntent, PurchaseKind};
use crate::domain::foundation::{CourseId, DomainError, PlanRef, Timestamp, UserId};
use crate::ports::CheckoutIntentRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the CheckoutIntentRepository port.
pub struct PostgresCheckoutIntentRepository {
    pool: PgPool,
}

impl PostgresCheckoutIntentRepository {
    /// Creates a new PostgresCheckoutIntentRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a checkout intent.
#[derive(Debug, sqlx::FromRow)]
struct CheckoutIntentRow {
    external_session_ref: String,
    user_id: Uuid,
    kind: String,
    plan_ref: Option<String>,
    billing_cycle: Option<String>,
    course_id: Option<Uuid>,
    gift_code: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CheckoutIntentRow> for CheckoutIntent {
    type Error = DomainError;

    fn try_from(row: CheckoutIntentRow) -> Result<Self, Self::Error> {
        Ok(CheckoutIntent {
            external_session_ref: row.external_session_ref,
            user_id: UserId::from_uuid(row.user_id),
            kind: parse_kind(&row.kind)?,
            plan_ref: row
                .plan_ref
                .map(PlanRef::new)
                .transpose()
                .map_err(|e| DomainError::database(format!("Invalid plan_ref: {}", e)))?,
            billing_cycle: row
                .billing_cycle
                .as_deref()
                .map(BillingCycle::parse)
                .transpose()
                .map_err(|e| DomainError::database(format!("Invalid billing cycle: {}", e)))?,
            course_id: row.course_id.map(CourseId::from_uuid),
            gift_code: row.gift_code,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

fn parse_kind(s: &str) -> Result<PurchaseKind, DomainError> {
    PurchaseKind::parse(s)
        .ok_or_else(|| DomainError::database(format!("Invalid purchase kind: {}", s)))
}

#[async_trait]
impl CheckoutIntentRepository for PostgresCheckoutIntentRepository {
    async fn save(&self, intent: &CheckoutIntent) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO checkout_intents (
                external_session_ref, user_id, kind, plan_ref, billing_cycle,
                course_id, gift_code, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (external_session_ref) DO NOTHING
            "#,
        )
        .bind(&intent.external_session_ref)
        .bind(intent.user_id.as_uuid())
        .bind(intent.kind.as_str())
        .bind(intent.plan_ref.as_ref().map(|p| p.as_str().to_string()))
        .bind(intent.billing_cycle.map(|c| c.as_str()))
        .bind(intent.course_id.map(|id| *id.as_uuid()))
        .bind(&intent.gift_code)
        .bind(intent.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to save checkout intent: {}", e)))?;

        Ok(())
    }

    async fn find_by_session_ref(
        &self,
        session_ref: &str,
    ) -> Result<Option<CheckoutIntent>, DomainError> {
        let row: Option<CheckoutIntentRow> = sqlx::query_as(
            r#"
            SELECT external_session_ref, user_id, kind, plan_ref, billing_cycle,
                   course_id, gift_code, created_at
            FROM checkout_intents
            WHERE external_session_ref = $1
            "#,
        )
        .bind(session_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find checkout intent: {}", e)))?;

        row.map(CheckoutIntent::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_intent_row_maps_to_domain() {
        let row = CheckoutIntentRow {
            external_session_ref: "cs_1".to_string(),
            user_id: Uuid::new_v4(),
            kind: "plan_subscription".to_string(),
            plan_ref: Some("premium".to_string()),
            billing_cycle: Some("monthly".to_string()),
            course_id: None,
            gift_code: None,
            created_at: Utc::now(),
        };
        let intent = CheckoutIntent::try_from(row).unwrap();
        assert_eq!(intent.kind, PurchaseKind::PlanSubscription);
        assert_eq!(intent.plan_ref.unwrap().as_str(), "premium");
        assert_eq!(intent.billing_cycle, Some(BillingCycle::Monthly));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let row = CheckoutIntentRow {
            external_session_ref: "cs_1".to_string(),
            user_id: Uuid::new_v4(),
            kind: "donation".to_string(),
            plan_ref: None,
            billing_cycle: None,
            course_id: None,
            gift_code: None,
            created_at: Utc::now(),
        };
        assert!(CheckoutIntent::try_from(row).is_err());
    }
}
