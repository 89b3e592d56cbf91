//! Route configuration for the entitlement API.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{
    billing_portal, cancel_subscription, create_checkout, get_subscription, list_gift_codes,
    payment_webhook, redeem_gift_code, validate_gift_code, verify_checkout, EntitlementAppState,
};

/// Creates the entitlement router with all endpoints.
///
/// Routes:
/// - `POST /api/checkout` - Open a hosted checkout session
/// - `POST /api/checkout/verify` - Confirm a session after redirect
/// - `GET /api/subscription` - Current entitlement view
/// - `POST /api/subscription/cancel` - Cancel at period end
/// - `POST /api/subscription/portal` - Open the hosted billing portal
/// - `GET /api/gifts` - Codes purchased by the caller
/// - `GET /api/gifts/:code` - Validate a code before redemption
/// - `POST /api/gifts/:code/redeem` - Redeem a code for the caller
/// - `POST /api/webhooks/payment` - Receive a payment authority event
pub fn entitlement_router() -> Router<EntitlementAppState> {
    Router::new()
        .route("/api/checkout", post(create_checkout))
        .route("/api/checkout/verify", post(verify_checkout))
        .route("/api/subscription", get(get_subscription))
        .route("/api/subscription/cancel", post(cancel_subscription))
        .route("/api/subscription/portal", post(billing_portal))
        .route("/api/gifts", get(list_gift_codes))
        .route("/api/gifts/:code", get(validate_gift_code))
        .route("/api/gifts/:code/redeem", post(redeem_gift_code))
        .route("/api/webhooks/payment", post(payment_webhook))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::catalog::StaticPlanCatalog;
    use crate::adapters::memory::{
        InMemoryCheckoutIntentRepository, InMemoryEntitlementRepository, InMemoryGiftCodeRepository,
        InMemoryProcessedEventStore,
    };
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::application::handlers::{
        CheckoutUrls, CreateCheckout, GiftService, ProcessPaymentWebhook, ReconciliationService,
        SubscriptionService, VerifyCheckout,
    };
    use crate::domain::entitlement::{Plan, WebhookVerifier};
    use crate::domain::foundation::{PlanRef, UserId};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn premium_plan() -> Plan {
        Plan {
            plan_ref: PlanRef::try_from("premium").unwrap(),
            name: "Premium".to_string(),
            monthly_price_id: Some("price_monthly".to_string()),
            yearly_price_id: Some("price_yearly".to_string()),
            monthly_amount_cents: 1900,
            yearly_amount_cents: 19000,
            currency: "usd".to_string(),
            profiles_allowed: 4,
            can_download: true,
        }
    }

    fn test_state() -> EntitlementAppState {
        let entitlements = Arc::new(InMemoryEntitlementRepository::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let catalog = Arc::new(StaticPlanCatalog::new(vec![premium_plan()]));
        let intents = Arc::new(InMemoryCheckoutIntentRepository::new());
        let gift_codes = Arc::new(InMemoryGiftCodeRepository::new());
        let journal = Arc::new(InMemoryProcessedEventStore::new());

        let reconciler = Arc::new(ReconciliationService::new(
            entitlements.clone(),
            gateway.clone(),
            catalog.clone(),
        ));

        EntitlementAppState {
            checkout: Arc::new(CreateCheckout::new(
                entitlements.clone(),
                gateway.clone(),
                catalog.clone(),
                intents,
                gift_codes.clone(),
                CheckoutUrls {
                    success_url: "https://app.example.test/done".to_string(),
                    cancel_url: "https://app.example.test/cancel".to_string(),
                },
            )),
            verify: Arc::new(VerifyCheckout::new(gateway.clone(), reconciler.clone())),
            subscriptions: Arc::new(SubscriptionService::new(
                entitlements.clone(),
                gateway.clone(),
                catalog.clone(),
                "https://app.example.test/account".to_string(),
            )),
            gifts: Arc::new(GiftService::new(
                gift_codes,
                entitlements,
                gateway,
                catalog,
            )),
            webhook: Arc::new(ProcessPaymentWebhook::new(
                WebhookVerifier::new("whsec_test"),
                journal,
                reconciler,
            )),
        }
    }

    #[tokio::test]
    async fn subscription_endpoint_returns_empty_view_for_new_user() {
        let app = entitlement_router().with_state(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/subscription")
                    .header("X-User-Id", UserId::new().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn subscription_endpoint_requires_authentication() {
        let app = entitlement_router().with_state(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/subscription")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn checkout_endpoint_creates_plan_session() {
        let app = entitlement_router().with_state(test_state());

        let body = serde_json::json!({
            "email": "learner@example.test",
            "purchase": {
                "kind": "plan",
                "plan_ref": "premium",
                "billing_cycle": "monthly"
            }
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/checkout")
                    .header("X-User-Id", UserId::new().to_string())
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn checkout_endpoint_rejects_unknown_plan() {
        let app = entitlement_router().with_state(test_state());

        let body = serde_json::json!({
            "email": "learner@example.test",
            "purchase": {
                "kind": "plan",
                "plan_ref": "nonexistent",
                "billing_cycle": "monthly"
            }
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/checkout")
                    .header("X-User-Id", UserId::new().to_string())
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn webhook_endpoint_rejects_missing_signature() {
        let app = entitlement_router().with_state(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/webhooks/payment")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_gift_code_returns_not_found() {
        let app = entitlement_router().with_state(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/gifts/K3NP-W8RT-2QZM")
                    .header("X-User-Id", UserId::new().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
