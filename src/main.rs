//! Service entrypoint: configuration, wiring, and the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use skillforge_entitlements::adapters::catalog::StaticPlanCatalog;
use skillforge_entitlements::adapters::http::{entitlement_router, EntitlementAppState};
use skillforge_entitlements::adapters::postgres::{
    PostgresCheckoutIntentRepository, PostgresEntitlementRepository, PostgresGiftCodeRepository,
    PostgresProcessedEventStore,
};
use skillforge_entitlements::adapters::stripe::{StripeGateway, StripeGatewayConfig};
use skillforge_entitlements::application::handlers::{
    CheckoutUrls, CreateCheckout, GiftService, ProcessPaymentWebhook, ReconciliationService,
    SubscriptionService, VerifyCheckout,
};
use skillforge_entitlements::config::AppConfig;
use skillforge_entitlements::domain::entitlement::WebhookVerifier;
use skillforge_entitlements::ports::{
    CheckoutIntentRepository, EntitlementRepository, GiftCodeRepository, PaymentGateway,
    PlanCatalog, ProcessedEventStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    config.validate()?;

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    let entitlements: Arc<dyn EntitlementRepository> =
        Arc::new(PostgresEntitlementRepository::new(pool.clone()));
    let gift_codes: Arc<dyn GiftCodeRepository> =
        Arc::new(PostgresGiftCodeRepository::new(pool.clone()));
    let intents: Arc<dyn CheckoutIntentRepository> =
        Arc::new(PostgresCheckoutIntentRepository::new(pool.clone()));
    let journal: Arc<dyn ProcessedEventStore> =
        Arc::new(PostgresProcessedEventStore::new(pool.clone()));

    let mut gateway_config = StripeGatewayConfig::new(config.payment.stripe_api_key.clone());
    if let Some(base_url) = &config.payment.api_base_url {
        gateway_config = gateway_config.with_base_url(base_url.clone());
    }
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(gateway_config));

    let catalog: Arc<dyn PlanCatalog> = Arc::new(StaticPlanCatalog::new(config.plans.to_plans()?));

    let reconciler = Arc::new(ReconciliationService::new(
        entitlements.clone(),
        gateway.clone(),
        catalog.clone(),
    ));

    let state = EntitlementAppState {
        checkout: Arc::new(CreateCheckout::new(
            entitlements.clone(),
            gateway.clone(),
            catalog.clone(),
            intents,
            gift_codes.clone(),
            CheckoutUrls {
                success_url: config.checkout.success_url.clone(),
                cancel_url: config.checkout.cancel_url.clone(),
            },
        )),
        verify: Arc::new(VerifyCheckout::new(gateway.clone(), reconciler.clone())),
        subscriptions: Arc::new(SubscriptionService::new(
            entitlements.clone(),
            gateway.clone(),
            catalog.clone(),
            config.checkout.portal_return_url.clone(),
        )),
        gifts: Arc::new(GiftService::new(gift_codes, entitlements, gateway, catalog)),
        webhook: Arc::new(ProcessPaymentWebhook::new(
            WebhookVerifier::new(config.payment.stripe_webhook_secret.clone()),
            journal,
            reconciler,
        )),
    };

    let app = entitlement_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let addr = config.server.socket_addr()?;
    info!(%addr, test_mode = config.payment.is_test_mode(), "Starting entitlement service");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
