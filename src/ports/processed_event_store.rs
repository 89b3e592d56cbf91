//! Port for the processed webhook event journal.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};

/// A journal entry for a handled webhook event.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    /// Remote event identifier (evt_xxx). Redeliveries reuse it.
    pub event_id: String,
    pub event_type: String,
    /// What processing concluded, e.g. "applied", "ignored", "orphaned".
    pub outcome: String,
    pub processed_at: Timestamp,
}

/// Result of recording an event as processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First time this event id was seen.
    Inserted,
    /// A concurrent delivery recorded it first; treat as duplicate.
    AlreadyExists,
}

/// Journal of processed webhook events, keyed by remote event id.
///
/// Backs exactly-once processing under redelivery: the first writer wins
/// and later deliveries of the same id are acknowledged without effect.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<ProcessedEvent>, DomainError>;

    /// Records the event. Must be atomic on `event_id` so concurrent
    /// deliveries resolve to one `Inserted` and the rest `AlreadyExists`.
    async fn save(&self, event: &ProcessedEvent) -> Result<SaveResult, DomainError>;
}
