//! In-memory adapter implementations.
//!
//! Used by unit and integration tests, and usable for local development
//! without a database. Concurrency semantics mirror the postgres adapters:
//! versioned updates, first-writer-wins journal inserts, and atomic
//! conditional gift redemption.

mod checkout_intent_repository;
mod entitlement_repository;
mod gift_code_repository;
mod processed_event_store;

pub use checkout_intent_repository::InMemoryCheckoutIntentRepository;
pub use entitlement_repository::InMemoryEntitlementRepository;
pub use gift_code_repository::InMemoryGiftCodeRepository;
pub use processed_event_store::InMemoryProcessedEventStore;
