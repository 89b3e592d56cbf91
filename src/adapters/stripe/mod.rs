//! Payment authority adapters.

mod gateway;
mod mock_gateway;
mod wire;

pub use gateway::{StripeGateway, StripeGatewayConfig};
pub use mock_gateway::MockPaymentGateway;
