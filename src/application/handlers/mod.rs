//! Application handlers - use case orchestration over ports.

mod create_checkout;
mod gift;
mod process_webhook;
mod reconcile;
mod subscription;
mod verify_checkout;

pub use create_checkout::{CheckoutCreated, CheckoutKind, CheckoutUrls, CreateCheckout};
pub use gift::{GiftCodeView, GiftRedeemed, GiftService};
pub use process_webhook::ProcessPaymentWebhook;
pub use reconcile::{map_remote_status, ReconcileOutcome, ReconciliationService};
pub use subscription::{SubscriptionService, SubscriptionView};
pub use verify_checkout::{VerifyCheckout, VerifyOutcome};
