//! Port for checkout intent bookkeeping.

use async_trait::async_trait;

use crate::domain::entitlement::CheckoutIntent;
use crate::domain::foundation::DomainError;

/// Repository for locally recorded checkout intents.
///
/// Intents are best-effort audit rows; reconciliation reads session
/// metadata from the authority instead and never depends on these.
#[async_trait]
pub trait CheckoutIntentRepository: Send + Sync {
    async fn save(&self, intent: &CheckoutIntent) -> Result<(), DomainError>;

    async fn find_by_session_ref(
        &self,
        session_ref: &str,
    ) -> Result<Option<CheckoutIntent>, DomainError>;
}
