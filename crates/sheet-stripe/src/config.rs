//! # Stripe Configuration
//!
//! Keys and endpoints for the Stripe-backed collaborators.
//! All secrets are loaded from environment variables.

use sheet_core::SheetError;
use std::env;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_API_VERSION: &str = "2024-12-18.acacia";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Stripe API configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Publishable key (pk_test_... or pk_live_...), used for client operations
    pub publishable_key: String,

    /// Customer whose payment methods the sheet manages (cus_...)
    pub customer_id: String,

    /// Ephemeral key scoped to the customer (ek_test_... or ek_live_...)
    pub customer_ephemeral_key: String,

    /// Connected account the requests act on behalf of (acct_...)
    pub account_id: Option<String>,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// API version
    pub api_version: String,

    pub request_timeout: Duration,
}

impl StripeConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `STRIPE_PUBLISHABLE_KEY`
    /// - `STRIPE_CUSTOMER_ID`
    /// - `STRIPE_CUSTOMER_EPHEMERAL_KEY`
    ///
    /// Optional: `STRIPE_ACCOUNT_ID`, `STRIPE_API_BASE_URL`.
    pub fn from_env() -> Result<Self, SheetError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let publishable_key = required("STRIPE_PUBLISHABLE_KEY")?;
        let customer_id = required("STRIPE_CUSTOMER_ID")?;
        let customer_ephemeral_key = required("STRIPE_CUSTOMER_EPHEMERAL_KEY")?;

        let mut config = Self::new(publishable_key, customer_id, customer_ephemeral_key);
        if let Ok(account_id) = env::var("STRIPE_ACCOUNT_ID") {
            config = config.with_account_id(account_id);
        }
        if let Ok(url) = env::var("STRIPE_API_BASE_URL") {
            config = config.with_api_base_url(url);
        }
        config.validate()?;
        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(
        publishable_key: impl Into<String>,
        customer_id: impl Into<String>,
        customer_ephemeral_key: impl Into<String>,
    ) -> Self {
        Self {
            publishable_key: publishable_key.into(),
            customer_id: customer_id.into(),
            customer_ephemeral_key: customer_ephemeral_key.into(),
            account_id: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Check key formats and that both keys target the same mode
    pub fn validate(&self) -> Result<(), SheetError> {
        if !self.publishable_key.starts_with("pk_test_")
            && !self.publishable_key.starts_with("pk_live_")
        {
            return Err(SheetError::Configuration(
                "STRIPE_PUBLISHABLE_KEY must start with pk_test_ or pk_live_".to_string(),
            ));
        }

        if !self.customer_ephemeral_key.starts_with("ek_test_")
            && !self.customer_ephemeral_key.starts_with("ek_live_")
        {
            return Err(SheetError::Configuration(
                "STRIPE_CUSTOMER_EPHEMERAL_KEY must start with ek_test_ or ek_live_".to_string(),
            ));
        }

        if self.is_live_mode() != self.customer_ephemeral_key.starts_with("ek_live_") {
            return Err(SheetError::Configuration(
                "publishable and ephemeral keys are for different modes".to_string(),
            ));
        }

        if !self.customer_id.starts_with("cus_") {
            return Err(SheetError::Configuration(
                "STRIPE_CUSTOMER_ID must start with cus_".to_string(),
            ));
        }

        if let Some(account_id) = &self.account_id {
            if !account_id.starts_with("acct_") {
                return Err(SheetError::Configuration(
                    "STRIPE_ACCOUNT_ID must start with acct_".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Check if using test keys
    pub fn is_test_mode(&self) -> bool {
        self.publishable_key.starts_with("pk_test_")
    }

    /// Check if using live keys
    pub fn is_live_mode(&self) -> bool {
        self.publishable_key.starts_with("pk_live_")
    }

    /// Authorization header for customer operations
    pub fn customer_auth_header(&self) -> String {
        format!("Bearer {}", self.customer_ephemeral_key)
    }

    /// Authorization header for client operations
    pub fn publishable_auth_header(&self) -> String {
        format!("Bearer {}", self.publishable_key)
    }

    /// Builder: act on behalf of a connected account
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn required(name: &str) -> Result<String, SheetError> {
    env::var(name).map_err(|_| SheetError::Configuration(format!("{} not set", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        // Valid test keys
        let config = StripeConfig::new("pk_test_xyz789", "cus_123", "ek_test_abc123");
        assert!(config.validate().is_ok());
        assert!(config.is_test_mode());
        assert!(!config.is_live_mode());

        // Valid live keys
        let config = StripeConfig::new("pk_live_xyz789", "cus_123", "ek_live_abc123");
        assert!(config.validate().is_ok());
        assert!(config.is_live_mode());
    }

    #[test]
    fn test_rejects_malformed_values() {
        let bad_key = StripeConfig::new("xyz789", "cus_123", "ek_test_abc123");
        assert!(matches!(bad_key.validate(), Err(SheetError::Configuration(_))));

        let bad_customer = StripeConfig::new("pk_test_xyz789", "123", "ek_test_abc123");
        assert!(bad_customer.validate().is_err());

        let bad_account = StripeConfig::new("pk_test_xyz789", "cus_123", "ek_test_abc123")
            .with_account_id("123");
        assert!(bad_account.validate().is_err());
    }

    #[test]
    fn test_rejects_mixed_modes() {
        let config = StripeConfig::new("pk_live_xyz789", "cus_123", "ek_test_abc123");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_headers() {
        let config = StripeConfig::new("pk_test_xyz789", "cus_123", "ek_test_abc123");
        assert_eq!(config.customer_auth_header(), "Bearer ek_test_abc123");
        assert_eq!(config.publishable_auth_header(), "Bearer pk_test_xyz789");
    }

    #[test]
    fn test_from_env_missing_key() {
        env::remove_var("STRIPE_PUBLISHABLE_KEY");

        let result = StripeConfig::from_env();
        assert!(result.is_err());
    }
}
