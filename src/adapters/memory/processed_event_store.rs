//! In-memory processed event journal.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::foundation::DomainError;
use crate::ports::{ProcessedEvent, ProcessedEventStore, SaveResult};

/// Journal backed by a mutex-guarded map. Insert-if-absent under one lock
/// acquisition gives the same first-writer-wins behavior as the postgres
/// `ON CONFLICT DO NOTHING` insert.
#[derive(Default)]
pub struct InMemoryProcessedEventStore {
    events: Mutex<HashMap<String, ProcessedEvent>>,
}

impl InMemoryProcessedEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<ProcessedEvent>, DomainError> {
        let events = self.events.lock().unwrap();
        Ok(events.get(event_id).cloned())
    }

    async fn save(&self, event: &ProcessedEvent) -> Result<SaveResult, DomainError> {
        let mut events = self.events.lock().unwrap();
        if events.contains_key(&event.event_id) {
            return Ok(SaveResult::AlreadyExists);
        }
        events.insert(event.event_id.clone(), event.clone());
        Ok(SaveResult::Inserted)
    }
}
