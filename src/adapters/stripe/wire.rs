//! Wire types for payment authority API responses.
//!
//! Session and subscription objects deserialize directly into the domain
//! payload types; only responses with no domain counterpart live here.

use serde::Deserialize;

/// Customer object returned by the customers API.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCustomer {
    pub id: String,
}

/// Billing portal session.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePortalSession {
    pub url: String,
}

/// Error envelope returned on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteErrorEnvelope {
    pub error: RemoteErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

impl RemoteErrorEnvelope {
    /// Human-readable message from an error body, best effort. Falls back
    /// to the error type when the body carries no message.
    pub fn message_from(body: &str) -> String {
        serde_json::from_str::<RemoteErrorEnvelope>(body)
            .ok()
            .and_then(|envelope| envelope.error.message.or(envelope.error.error_type))
            .unwrap_or_else(|| body.to_string())
    }
}
