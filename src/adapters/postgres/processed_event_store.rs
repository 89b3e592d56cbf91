//! PostgreSQL implementation of ProcessedEventStore.
//!
//! The journal is keyed by remote event id; insertion races between
//! concurrent deliveries resolve through the primary key, first writer wins.

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{ProcessedEvent, ProcessedEventStore, SaveResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// PostgreSQL implementation of the ProcessedEventStore port.
pub struct PostgresProcessedEventStore {
    pool: PgPool,
}

impl PostgresProcessedEventStore {
    /// Creates a new PostgresProcessedEventStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProcessedEventRow {
    event_id: String,
    event_type: String,
    outcome: String,
    processed_at: DateTime<Utc>,
}

impl From<ProcessedEventRow> for ProcessedEvent {
    fn from(row: ProcessedEventRow) -> Self {
        ProcessedEvent {
            event_id: row.event_id,
            event_type: row.event_type,
            outcome: row.outcome,
            processed_at: Timestamp::from_datetime(row.processed_at),
        }
    }
}

#[async_trait]
impl ProcessedEventStore for PostgresProcessedEventStore {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<ProcessedEvent>, DomainError> {
        let row: Option<ProcessedEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, outcome, processed_at
            FROM processed_payment_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find processed event: {}", e)))?;

        Ok(row.map(ProcessedEvent::from))
    }

    async fn save(&self, event: &ProcessedEvent) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_payment_events (event_id, event_type, outcome, processed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.outcome)
        .bind(event.processed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to save processed event: {}", e)))?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_maps_to_domain_event() {
        let event = ProcessedEvent::from(ProcessedEventRow {
            event_id: "evt_1".to_string(),
            event_type: "invoice.paid".to_string(),
            outcome: "applied".to_string(),
            processed_at: Utc::now(),
        });
        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.outcome, "applied");
    }
}
