//! Checkout redirect configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Redirect URLs used by hosted checkout and the billing portal
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutConfig {
    /// Where the payment authority sends the user after paying
    pub success_url: String,

    /// Where the payment authority sends the user on abandon
    pub cancel_url: String,

    /// Where the billing portal returns the user
    pub portal_return_url: String,
}

impl CheckoutConfig {
    /// Validate checkout configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, url) in [
            ("CHECKOUT_SUCCESS_URL", &self.success_url),
            ("CHECKOUT_CANCEL_URL", &self.cancel_url),
            ("CHECKOUT_PORTAL_RETURN_URL", &self.portal_return_url),
        ] {
            if url.is_empty() {
                return Err(ValidationError::MissingRequired(name));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::InvalidRedirectUrl(url.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CheckoutConfig {
        CheckoutConfig {
            success_url: "https://app.example.test/checkout/done".to_string(),
            cancel_url: "https://app.example.test/checkout/cancel".to_string(),
            portal_return_url: "https://app.example.test/account".to_string(),
        }
    }

    #[test]
    fn validation_accepts_https_urls() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validation_rejects_missing_url() {
        let mut config = valid();
        config.cancel_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_non_http_url() {
        let mut config = valid();
        config.success_url = "ftp://app.example.test/done".to_string();
        assert!(config.validate().is_err());
    }
}
