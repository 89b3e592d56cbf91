//! PostgreSQL adapter implementations of the persistence ports.

mod checkout_intent_repository;
mod entitlement_repository;
mod gift_code_repository;
mod processed_event_store;

pub use checkout_intent_repository::PostgresCheckoutIntentRepository;
pub use entitlement_repository::PostgresEntitlementRepository;
pub use gift_code_repository::PostgresGiftCodeRepository;
pub use processed_event_store::PostgresProcessedEventStore;
