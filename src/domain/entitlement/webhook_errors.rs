//! Webhook error types.
//!
//! Error conditions that occur while receiving and reconciling payment
//! authority notifications, with HTTP status mapping that drives the
//! authority's redelivery behavior.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature timestamp is older than the acceptance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signature timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse the signature header or JSON payload.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required metadata key missing from the session object.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// Required field missing from the event payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Optimistic writes kept colliding; the authority should redeliver.
    #[error("Concurrent update conflict")]
    ConflictRetryExhausted,

    /// Call back to the payment authority failed.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// True if the authority should retry delivering this event.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::ConflictRetryExhausted
                | WebhookError::Gateway(_)
                | WebhookError::Database(_)
        )
    }

    /// Maps the error to the HTTP status returned to the authority.
    ///
    /// - 2xx acknowledges the event, no redelivery
    /// - 4xx rejects it permanently
    /// - 5xx makes the authority redeliver later
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => {
                StatusCode::UNAUTHORIZED
            }

            WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_)
            | WebhookError::MissingMetadata(_)
            | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            WebhookError::ConflictRetryExhausted
            | WebhookError::Gateway(_)
            | WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_failures_return_unauthorized_without_retry() {
        for err in [
            WebhookError::InvalidSignature,
            WebhookError::TimestampOutOfRange,
        ] {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn malformed_payloads_return_bad_request_without_retry() {
        for err in [
            WebhookError::InvalidTimestamp,
            WebhookError::ParseError("bad json".to_string()),
            WebhookError::MissingMetadata("user_id"),
            WebhookError::MissingField("subscription"),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn transient_failures_return_server_error_and_retry() {
        for err in [
            WebhookError::ConflictRetryExhausted,
            WebhookError::Gateway("timeout".to_string()),
            WebhookError::Database("connection lost".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn parse_error_displays_message() {
        let err = WebhookError::ParseError("invalid JSON".to_string());
        assert_eq!(format!("{}", err), "Parse error: invalid JSON");
    }

    #[test]
    fn missing_metadata_displays_key() {
        let err = WebhookError::MissingMetadata("purchase_kind");
        assert_eq!(format!("{}", err), "Missing metadata: purchase_kind");
    }
}
