//! Application layer - use cases wiring domain logic to ports.

pub mod handlers;
