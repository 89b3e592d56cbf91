//! HTTP handlers for the entitlement API.
//!
//! These handlers connect Axum routes to the application services. The
//! webhook endpoint is special: it reads the raw body so the signature can
//! be verified over the exact bytes, and its error responses follow the
//! retry contract the payment authority expects.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use crate::application::handlers::{
    CheckoutKind, CreateCheckout, GiftService, ProcessPaymentWebhook, SubscriptionService,
    VerifyCheckout,
};
use crate::domain::entitlement::{BillingCycle, EntitlementError};
use crate::domain::foundation::{CourseId, PlanRef, UserId};

use super::dto::{
    CheckoutResponse, CreateCheckoutRequest, ErrorResponse, GiftCodeResponse,
    GiftRedeemedResponse, PortalResponse, PurchasedGiftResponse, PurchaseRequest,
    SubscriptionResponse, VerifyCheckoutRequest, VerifyResponse, WebhookAck,
};

/// Header carrying the webhook signature.
const SIGNATURE_HEADER: &str = "stripe-signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing the entitlement services.
#[derive(Clone)]
pub struct EntitlementAppState {
    pub checkout: Arc<CreateCheckout>,
    pub verify: Arc<VerifyCheckout>,
    pub subscriptions: Arc<SubscriptionService>,
    pub gifts: Arc<GiftService>,
    pub webhook: Arc<ProcessPaymentWebhook>,
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from the request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("UNAUTHORIZED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user_id = parts
                .headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<UserId>().ok())
                .ok_or(AuthenticationRequired)?;

            Ok(AuthenticatedUser { user_id })
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Checkout
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/checkout - Open a hosted checkout session
pub async fn create_checkout(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = checkout_kind(request.purchase)?;
    let created = state
        .checkout
        .execute(user.user_id, &request.email, kind)
        .await?;

    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(created))))
}

/// POST /api/checkout/verify - Confirm a session after redirect
pub async fn verify_checkout(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
    Json(request): Json<VerifyCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .verify
        .execute(user.user_id, &request.session_ref)
        .await?;

    Ok(Json(VerifyResponse::from(outcome)))
}

fn checkout_kind(purchase: PurchaseRequest) -> Result<CheckoutKind, ApiError> {
    match purchase {
        PurchaseRequest::Plan {
            plan_ref,
            billing_cycle,
        } => Ok(CheckoutKind::Plan {
            plan_ref: parse_plan_ref(&plan_ref)?,
            billing_cycle: parse_cycle(&billing_cycle)?,
        }),
        PurchaseRequest::Course {
            course_id,
            title,
            amount_cents,
            currency,
        } => {
            if amount_cents <= 0 {
                return Err(ApiError::BadRequest(
                    "Course price must be positive".to_string(),
                ));
            }
            let course_id: CourseId = course_id
                .parse()
                .map_err(|_| ApiError::BadRequest("Invalid course ID format".to_string()))?;
            Ok(CheckoutKind::Course {
                course_id,
                title,
                amount_cents,
                currency,
            })
        }
        PurchaseRequest::Gift {
            plan_ref,
            billing_cycle,
        } => Ok(CheckoutKind::Gift {
            plan_ref: parse_plan_ref(&plan_ref)?,
            billing_cycle: parse_cycle(&billing_cycle)?,
        }),
    }
}

fn parse_plan_ref(value: &str) -> Result<PlanRef, ApiError> {
    PlanRef::new(value).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn parse_cycle(value: &str) -> Result<BillingCycle, ApiError> {
    BillingCycle::parse(value).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/subscription - Current entitlement view
pub async fn get_subscription(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.subscriptions.get_status(user.user_id).await?;
    Ok(Json(SubscriptionResponse::from(view)))
}

/// POST /api/subscription/cancel - Cancel at period end
pub async fn cancel_subscription(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.subscriptions.cancel(user.user_id).await?;
    Ok(Json(SubscriptionResponse::from(view)))
}

/// POST /api/subscription/portal - Open the hosted billing portal
pub async fn billing_portal(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let url = state.subscriptions.billing_portal(user.user_id).await?;
    Ok(Json(PortalResponse { url }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Gift Codes
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/gifts - Codes purchased by the caller
pub async fn list_gift_codes(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let codes = state.gifts.list_purchased(user.user_id).await?;
    let response: Vec<PurchasedGiftResponse> = codes
        .into_iter()
        .map(PurchasedGiftResponse::from)
        .collect();
    Ok(Json(response))
}

/// GET /api/gifts/:code - Validate a code before redemption
pub async fn validate_gift_code(
    State(state): State<EntitlementAppState>,
    _user: AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.gifts.validate(&code).await?;
    Ok(Json(GiftCodeResponse::from(view)))
}

/// POST /api/gifts/:code/redeem - Redeem a code for the caller
pub async fn redeem_gift_code(
    State(state): State<EntitlementAppState>,
    user: AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let redeemed = state.gifts.redeem(user.user_id, &code).await?;
    Ok(Json(GiftRedeemedResponse::from(redeemed)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/payment - Receive a payment authority event
///
/// Reads the raw body; the signature covers the exact bytes on the wire.
/// Non-2xx responses with retryable causes make the authority redeliver.
pub async fn payment_webhook(
    State(state): State<EntitlementAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        let error = ErrorResponse::bad_request("Missing signature header");
        return (StatusCode::BAD_REQUEST, Json(error)).into_response();
    };

    match state.webhook.execute(&body, signature).await {
        Ok(outcome) => Json(WebhookAck::from(outcome)).into_response(),
        Err(err) => {
            let status = err.status_code();
            let error = ErrorResponse::new("WEBHOOK_ERROR", err.to_string());
            (status, Json(error)).into_response()
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts operation errors to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Forbidden(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl From<EntitlementError> for ApiError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::Validation(e) => ApiError::BadRequest(e.to_string()),
            EntitlementError::CycleUnavailable { .. } => ApiError::BadRequest(err.to_string()),
            EntitlementError::PlanNotFound(_)
            | EntitlementError::CodeNotFound
            | EntitlementError::SessionNotFound
            | EntitlementError::RecordNotFound
            | EntitlementError::NoSubscription => ApiError::NotFound(err.to_string()),
            EntitlementError::SessionOwnerMismatch | EntitlementError::SubscriptionRequired => {
                ApiError::Forbidden(err.to_string())
            }
            EntitlementError::AlreadyPurchased
            | EntitlementError::CodeExpired
            | EntitlementError::CodeAlreadyRedeemed
            | EntitlementError::PaymentNotConfirmed
            | EntitlementError::ConflictRetryExhausted => ApiError::Conflict(err.to_string()),
            EntitlementError::GatewayUnavailable(_) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            EntitlementError::Configuration(_)
            | EntitlementError::CodeGenerationExhausted
            | EntitlementError::Database(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::bad_request(msg))
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::not_found(msg)),
            ApiError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, ErrorResponse::new("FORBIDDEN", msg))
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse::new("CONFLICT", msg)),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("SERVICE_UNAVAILABLE", msg),
            ),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::internal(msg))
            }
        };

        (status, Json(error)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_maps_bad_request_to_400() {
        let response = ApiError::BadRequest("test".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn api_error_maps_not_found_to_404() {
        let response = ApiError::NotFound("test".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn api_error_maps_conflict_to_409() {
        let response = ApiError::Conflict("test".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn api_error_maps_gateway_trouble_to_503() {
        let err = ApiError::from(EntitlementError::GatewayUnavailable("timeout".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn already_redeemed_maps_to_conflict() {
        let err = ApiError::from(EntitlementError::CodeAlreadyRedeemed);
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn owner_mismatch_maps_to_forbidden() {
        let err = ApiError::from(EntitlementError::SessionOwnerMismatch);
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn checkout_kind_rejects_bad_plan_ref() {
        let purchase = PurchaseRequest::Plan {
            plan_ref: "Not A Slug".to_string(),
            billing_cycle: "monthly".to_string(),
        };
        assert!(matches!(checkout_kind(purchase), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn checkout_kind_rejects_nonpositive_course_price() {
        let purchase = PurchaseRequest::Course {
            course_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            title: "Free Course".to_string(),
            amount_cents: 0,
            currency: "usd".to_string(),
        };
        assert!(matches!(checkout_kind(purchase), Err(ApiError::BadRequest(_))));
    }
}
