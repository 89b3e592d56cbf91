//! Port for gift code persistence.

use async_trait::async_trait;

use crate::domain::entitlement::GiftCode;
use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// Result of inserting a freshly generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The code value collided with an existing row; generate another.
    CodeExists,
}

/// Result of an atomic redemption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// This caller won; the code is now redeemed by them.
    Redeemed,
    /// The code was no longer pending. Concurrent redeemers lose here.
    NotPending,
}

/// Repository for gift codes.
#[async_trait]
pub trait GiftCodeRepository: Send + Sync {
    /// Inserts a new code, failing softly on code collision so the caller
    /// can regenerate.
    async fn insert(&self, code: &GiftCode) -> Result<InsertOutcome, DomainError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<GiftCode>, DomainError>;

    /// Codes purchased by the given user, newest first.
    async fn list_by_purchaser(&self, user_id: UserId) -> Result<Vec<GiftCode>, DomainError>;

    /// Atomically marks a pending code redeemed.
    ///
    /// Must be a single conditional write (`status = pending` guard) so
    /// exactly one concurrent redeemer wins.
    async fn mark_redeemed(
        &self,
        code: &str,
        redeemed_by: UserId,
        redeemed_at: Timestamp,
    ) -> Result<RedeemOutcome, DomainError>;

    /// Marks a lapsed pending code expired. Advisory; reads apply the
    /// expiry window lazily regardless.
    async fn mark_expired(&self, code: &str) -> Result<(), DomainError>;
}
