//! In-memory entitlement repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::entitlement::EntitlementRecord;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{EntitlementRepository, UpdateOutcome};

/// Entitlement repository backed by a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryEntitlementRepository {
    records: Mutex<HashMap<UserId, EntitlementRecord>>,
}

impl InMemoryEntitlementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record directly, for test setup.
    pub fn seed(&self, record: EntitlementRecord) {
        let mut records = self.records.lock().unwrap();
        records.insert(record.user_id, record);
    }
}

#[async_trait]
impl EntitlementRepository for InMemoryEntitlementRepository {
    async fn find_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        let records = self.records.lock().unwrap();
        Ok(records.get(&user_id).cloned())
    }

    async fn find_or_create(&self, user_id: UserId) -> Result<EntitlementRecord, DomainError> {
        let mut records = self.records.lock().unwrap();
        Ok(records
            .entry(user_id)
            .or_insert_with(|| EntitlementRecord::new(user_id))
            .clone())
    }

    async fn find_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .find(|record| {
                record
                    .subscription
                    .as_ref()
                    .and_then(|sub| sub.external_subscription_ref.as_deref())
                    == Some(subscription_ref)
            })
            .cloned())
    }

    async fn update(
        &self,
        record: &EntitlementRecord,
        expected_version: u64,
    ) -> Result<UpdateOutcome, DomainError> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&record.user_id) {
            Some(stored) if stored.version == expected_version => {
                let mut updated = record.clone();
                updated.version = expected_version + 1;
                *stored = updated;
                Ok(UpdateOutcome::Updated)
            }
            Some(_) => Ok(UpdateOutcome::VersionConflict),
            None => Err(DomainError::database("record vanished during update")),
        }
    }
}
