//! Payment authority adapter over the Stripe HTTP API.
//!
//! Form-encoded requests, basic auth with the secret API key, and a
//! bounded request timeout. 404 responses on fetches map to `None`; other
//! failures map onto `GatewayError` by status class.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use crate::domain::entitlement::{SessionObject, SubscriptionObject};
use crate::domain::foundation::UserId;
use crate::ports::{
    CreateSessionRequest, GatewayError, PaymentGateway, SessionHandle, SessionLineItem,
    SessionMode,
};

use super::wire::{RemoteCustomer, RemoteErrorEnvelope, RemotePortalSession};

/// Wall-clock budget per API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway configuration.
#[derive(Clone)]
pub struct StripeGatewayConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    pub api_key: SecretString,

    /// Base URL for the API. Overridable for tests.
    pub api_base_url: String,
}

impl StripeGatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: "https://api.stripe.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// HTTP client for the payment authority.
pub struct StripeGateway {
    config: StripeGatewayConfig,
    http_client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeGatewayConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            config,
            http_client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let response = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, GatewayError> {
        let response = self
            .http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode_response(response).await.map(Some)
    }
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Network(err.to_string())
    }
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = RemoteErrorEnvelope::message_from(&body);
    tracing::warn!(
        status = %status,
        error = %message,
        "Payment authority request failed"
    );

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Err(GatewayError::RateLimited)
    } else if status.is_client_error() {
        Err(GatewayError::Rejected(message))
    } else {
        Err(GatewayError::Remote(message))
    }
}

/// Flattens a session request into the bracketed form fields the API
/// expects. Metadata keys are sorted for stable request bodies.
fn session_params(request: &CreateSessionRequest) -> Vec<(String, String)> {
    let mode = match request.mode {
        SessionMode::Payment => "payment",
        SessionMode::Subscription => "subscription",
    };
    let mut params: Vec<(String, String)> = vec![
        ("customer".to_string(), request.customer_ref.clone()),
        ("mode".to_string(), mode.to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
    ];

    match &request.line_item {
        SessionLineItem::Price { price_id } => {
            params.push(("line_items[0][price]".to_string(), price_id.clone()));
        }
        SessionLineItem::Amount {
            name,
            amount_cents,
            currency,
        } => {
            params.push((
                "line_items[0][price_data][currency]".to_string(),
                currency.clone(),
            ));
            params.push((
                "line_items[0][price_data][unit_amount]".to_string(),
                amount_cents.to_string(),
            ));
            params.push((
                "line_items[0][price_data][product_data][name]".to_string(),
                name.clone(),
            ));
        }
    }

    let mut metadata: Vec<(&String, &String)> = request.metadata.iter().collect();
    metadata.sort();
    for (key, value) in metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
    }
    params
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<String, GatewayError> {
        let params = [
            ("email", email.to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];
        let customer: RemoteCustomer = self.post_form("/v1/customers", &params).await?;
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionHandle, GatewayError> {
        let params = session_params(&request);

        let response = self
            .http_client
            .post(self.url("/v1/checkout/sessions"))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(map_transport_error)?;
        let session: SessionWithUrl = decode_response(response).await?;

        Ok(SessionHandle {
            id: session.id,
            url: session.url.unwrap_or_default(),
        })
    }

    async fn get_session(&self, session_ref: &str) -> Result<Option<SessionObject>, GatewayError> {
        self.get(&format!("/v1/checkout/sessions/{}", session_ref))
            .await
    }

    async fn get_subscription(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<SubscriptionObject>, GatewayError> {
        self.get(&format!("/v1/subscriptions/{}", subscription_ref))
            .await
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_ref: &str,
        cancel: bool,
    ) -> Result<SubscriptionObject, GatewayError> {
        let params = [("cancel_at_period_end", cancel.to_string())];
        self.post_form(&format!("/v1/subscriptions/{}", subscription_ref), &params)
            .await
    }

    async fn create_portal_session(
        &self,
        customer_ref: &str,
        return_url: &str,
    ) -> Result<String, GatewayError> {
        let params = [
            ("customer", customer_ref.to_string()),
            ("return_url", return_url.to_string()),
        ];
        let session: RemotePortalSession =
            self.post_form("/v1/billing_portal/sessions", &params).await?;
        Ok(session.url)
    }
}

/// Checkout session creation response; only id and redirect URL matter.
#[derive(Debug, serde::Deserialize)]
struct SessionWithUrl {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(line_item: SessionLineItem) -> CreateSessionRequest {
        let mut metadata = HashMap::new();
        metadata.insert("purchase_kind".to_string(), "course".to_string());
        metadata.insert("user_id".to_string(), "u-1".to_string());
        CreateSessionRequest {
            customer_ref: "cus_1".to_string(),
            mode: SessionMode::Payment,
            line_item,
            metadata,
            success_url: "https://app.example.test/done".to_string(),
            cancel_url: "https://app.example.test/cancel".to_string(),
        }
    }

    #[test]
    fn price_line_item_encodes_price_param() {
        let params = session_params(&request(SessionLineItem::Price {
            price_id: "price_123".to_string(),
        }));
        assert!(params.contains(&("line_items[0][price]".to_string(), "price_123".to_string())));
        assert!(params.contains(&("mode".to_string(), "payment".to_string())));
    }

    #[test]
    fn amount_line_item_encodes_price_data() {
        let params = session_params(&request(SessionLineItem::Amount {
            name: "Rust Fundamentals".to_string(),
            amount_cents: 4900,
            currency: "usd".to_string(),
        }));
        assert!(params.contains(&(
            "line_items[0][price_data][unit_amount]".to_string(),
            "4900".to_string()
        )));
        assert!(params.contains(&(
            "line_items[0][price_data][product_data][name]".to_string(),
            "Rust Fundamentals".to_string()
        )));
    }

    #[test]
    fn metadata_is_flattened_into_bracket_keys() {
        let params = session_params(&request(SessionLineItem::Price {
            price_id: "price_123".to_string(),
        }));
        assert!(params.contains(&("metadata[purchase_kind]".to_string(), "course".to_string())));
        assert!(params.contains(&("metadata[user_id]".to_string(), "u-1".to_string())));
    }
}
