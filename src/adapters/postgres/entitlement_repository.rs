//! PostgreSQL implementation of EntitlementRepository.
//!
//! The entitlement record maps to one row in `entitlement_records` plus a
//! child `course_purchases` table. Subscription fields live as nullable
//! columns on the record row; a NULL `plan_ref` means no subscription.
//! Versioned updates guard the UPDATE with the expected version so
//! concurrent reconcilers serialize through retry.

use crate::domain::entitlement::{
    CoursePurchase, EntitlementRecord, SubscriptionState, SubscriptionStatus,
};
use crate::domain::foundation::{CourseId, DomainError, PlanRef, Timestamp, UserId};
use crate::ports::{EntitlementRepository, UpdateOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the EntitlementRepository port.
pub struct PostgresEntitlementRepository {
    pool: PgPool,
}

impl PostgresEntitlementRepository {
    /// Creates a new PostgresEntitlementRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_purchases(&self, user_id: Uuid) -> Result<Vec<CoursePurchase>, DomainError> {
        let rows: Vec<CoursePurchaseRow> = sqlx::query_as(
            r#"
            SELECT course_id, purchased_at, external_session_ref
            FROM course_purchases
            WHERE user_id = $1
            ORDER BY purchased_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to load course purchases: {}", e)))?;

        Ok(rows.into_iter().map(CoursePurchase::from).collect())
    }

    async fn hydrate(
        &self,
        row: EntitlementRow,
    ) -> Result<EntitlementRecord, DomainError> {
        let user_id = row.user_id;
        let mut record = EntitlementRecord::try_from(row)?;
        record.purchased_courses = self.load_purchases(user_id).await?;
        Ok(record)
    }
}

/// Database row representation of an entitlement record.
#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    user_id: Uuid,
    external_customer_ref: Option<String>,
    plan_ref: Option<String>,
    subscription_status: Option<String>,
    external_subscription_ref: Option<String>,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
    profiles_allowed: Option<i32>,
    can_download: Option<bool>,
    cancel_at_period_end: Option<bool>,
    is_gift: Option<bool>,
    gift_code_used: Option<String>,
    last_event_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct CoursePurchaseRow {
    course_id: Uuid,
    purchased_at: DateTime<Utc>,
    external_session_ref: Option<String>,
}

impl From<CoursePurchaseRow> for CoursePurchase {
    fn from(row: CoursePurchaseRow) -> Self {
        CoursePurchase {
            course_id: CourseId::from_uuid(row.course_id),
            purchased_at: Timestamp::from_datetime(row.purchased_at),
            external_session_ref: row.external_session_ref,
        }
    }
}

impl TryFrom<EntitlementRow> for EntitlementRecord {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let subscription = match row.plan_ref {
            Some(plan_ref) => Some(SubscriptionState {
                plan_ref: PlanRef::new(plan_ref)
                    .map_err(|e| DomainError::database(format!("Invalid plan_ref: {}", e)))?,
                status: parse_status(row.subscription_status.as_deref().unwrap_or_default())?,
                external_subscription_ref: row.external_subscription_ref,
                period_start: required_timestamp(row.period_start, "period_start")?,
                period_end: required_timestamp(row.period_end, "period_end")?,
                profiles_allowed: row.profiles_allowed.unwrap_or(1).max(0) as u32,
                can_download: row.can_download.unwrap_or(false),
                cancel_at_period_end: row.cancel_at_period_end.unwrap_or(false),
                is_gift: row.is_gift.unwrap_or(false),
                gift_code_used: row.gift_code_used,
                last_event_at: required_timestamp(row.last_event_at, "last_event_at")?,
            }),
            None => None,
        };

        Ok(EntitlementRecord {
            user_id: UserId::from_uuid(row.user_id),
            external_customer_ref: row.external_customer_ref,
            subscription,
            purchased_courses: Vec::new(),
            version: row.version.max(0) as u64,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn required_timestamp(
    value: Option<DateTime<Utc>>,
    column: &str,
) -> Result<Timestamp, DomainError> {
    value.map(Timestamp::from_datetime).ok_or_else(|| {
        DomainError::database(format!("Column {} must be set when plan_ref is set", column))
    })
}

fn parse_status(s: &str) -> Result<SubscriptionStatus, DomainError> {
    SubscriptionStatus::parse(s)
        .ok_or_else(|| DomainError::database(format!("Invalid subscription status: {}", s)))
}

#[async_trait]
impl EntitlementRepository for PostgresEntitlementRepository {
    async fn find_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        let row: Option<EntitlementRow> = sqlx::query_as(
            r#"
            SELECT user_id, external_customer_ref, plan_ref, subscription_status,
                   external_subscription_ref, period_start, period_end, profiles_allowed,
                   can_download, cancel_at_period_end, is_gift, gift_code_used,
                   last_event_at, version, created_at, updated_at
            FROM entitlement_records
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find entitlement record: {}", e)))?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_or_create(&self, user_id: UserId) -> Result<EntitlementRecord, DomainError> {
        let fresh = EntitlementRecord::new(user_id);

        // Lost races fall through to the read below.
        sqlx::query(
            r#"
            INSERT INTO entitlement_records (user_id, version, created_at, updated_at)
            VALUES ($1, 0, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(fresh.created_at.as_datetime())
        .bind(fresh.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::database(format!("Failed to create entitlement record: {}", e))
        })?;

        self.find_by_user(user_id).await?.ok_or_else(|| {
            DomainError::database("Entitlement record vanished after insert")
        })
    }

    async fn find_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        let row: Option<EntitlementRow> = sqlx::query_as(
            r#"
            SELECT user_id, external_customer_ref, plan_ref, subscription_status,
                   external_subscription_ref, period_start, period_end, profiles_allowed,
                   can_download, cancel_at_period_end, is_gift, gift_code_used,
                   last_event_at, version, created_at, updated_at
            FROM entitlement_records
            WHERE external_subscription_ref = $1
            "#,
        )
        .bind(subscription_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find entitlement record: {}", e)))?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        record: &EntitlementRecord,
        expected_version: u64,
    ) -> Result<UpdateOutcome, DomainError> {
        let subscription = record.subscription.as_ref();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database(format!("Failed to begin transaction: {}", e)))?;

        let result = sqlx::query(
            r#"
            UPDATE entitlement_records SET
                external_customer_ref = $3,
                plan_ref = $4,
                subscription_status = $5,
                external_subscription_ref = $6,
                period_start = $7,
                period_end = $8,
                profiles_allowed = $9,
                can_download = $10,
                cancel_at_period_end = $11,
                is_gift = $12,
                gift_code_used = $13,
                last_event_at = $14,
                updated_at = $15,
                version = version + 1
            WHERE user_id = $1 AND version = $2
            "#,
        )
        .bind(record.user_id.as_uuid())
        .bind(expected_version as i64)
        .bind(&record.external_customer_ref)
        .bind(subscription.map(|s| s.plan_ref.as_str().to_string()))
        .bind(subscription.map(|s| s.status.as_str()))
        .bind(subscription.and_then(|s| s.external_subscription_ref.clone()))
        .bind(subscription.map(|s| *s.period_start.as_datetime()))
        .bind(subscription.map(|s| *s.period_end.as_datetime()))
        .bind(subscription.map(|s| s.profiles_allowed as i32))
        .bind(subscription.map(|s| s.can_download))
        .bind(subscription.map(|s| s.cancel_at_period_end))
        .bind(subscription.map(|s| s.is_gift))
        .bind(subscription.and_then(|s| s.gift_code_used.clone()))
        .bind(subscription.map(|s| *s.last_event_at.as_datetime()))
        .bind(record.updated_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            DomainError::database(format!("Failed to update entitlement record: {}", e))
        })?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| DomainError::database(format!("Failed to roll back: {}", e)))?;
            return Ok(UpdateOutcome::VersionConflict);
        }

        // Purchases are append-only; re-insert the full set idempotently.
        for purchase in &record.purchased_courses {
            sqlx::query(
                r#"
                INSERT INTO course_purchases (user_id, course_id, purchased_at, external_session_ref)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, course_id) DO NOTHING
                "#,
            )
            .bind(record.user_id.as_uuid())
            .bind(purchase.course_id.as_uuid())
            .bind(purchase.purchased_at.as_datetime())
            .bind(&purchase.external_session_ref)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::database(format!("Failed to save course purchase: {}", e))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::database(format!("Failed to commit: {}", e)))?;

        Ok(UpdateOutcome::Updated)
    }
}
