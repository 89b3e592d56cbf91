//! HTTP adapter - Axum routes, handlers, and DTOs for the entitlement API.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::EntitlementAppState;
pub use routes::entitlement_router;
