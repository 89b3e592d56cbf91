//! Port for entitlement record persistence.

use async_trait::async_trait;

use crate::domain::entitlement::EntitlementRecord;
use crate::domain::foundation::{DomainError, UserId};

/// Result of a versioned update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record was written and its version advanced.
    Updated,
    /// Another writer advanced the version first; reload and retry.
    VersionConflict,
}

/// Repository for entitlement records.
///
/// Writes use optimistic concurrency: `update` succeeds only when the
/// stored version matches the one the record was loaded at.
#[async_trait]
pub trait EntitlementRepository: Send + Sync {
    /// Finds the record for a user, if any.
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<EntitlementRecord>, DomainError>;

    /// Finds the record for a user, creating an empty one if absent.
    async fn find_or_create(&self, user_id: UserId) -> Result<EntitlementRecord, DomainError>;

    /// Finds the record holding the given remote subscription reference.
    async fn find_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError>;

    /// Persists the record if its version is unchanged since load.
    ///
    /// The caller passes the version the record was loaded at; on success
    /// the stored version becomes `expected_version + 1`.
    async fn update(
        &self,
        record: &EntitlementRecord,
        expected_version: u64,
    ) -> Result<UpdateOutcome, DomainError>;
}
