//! Ports - trait boundaries between the domain and infrastructure.

mod checkout_intent_repository;
mod entitlement_repository;
mod gift_code_repository;
mod payment_gateway;
mod plan_catalog;
mod processed_event_store;

pub use checkout_intent_repository::CheckoutIntentRepository;
pub use entitlement_repository::{EntitlementRepository, UpdateOutcome};
pub use gift_code_repository::{GiftCodeRepository, InsertOutcome, RedeemOutcome};
pub use payment_gateway::{
    CreateSessionRequest, GatewayError, PaymentGateway, SessionHandle, SessionLineItem,
    SessionMode,
};
pub use plan_catalog::PlanCatalog;
pub use processed_event_store::{ProcessedEvent, ProcessedEventStore, SaveResult};
