//! # Sheet Configuration
//!
//! Merchant-facing configuration for the customer sheet.
//! Can be built in code or loaded from a TOML file such as `config/sheet.toml`.

use crate::error::SheetError;
use crate::payment_method::CardBrand;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default wait for the customer backend to be provided
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 5_000;

/// Default pause between an edit-screen removal and the list update
pub const DEFAULT_REMOVAL_DELAY_MS: u64 = 600;

/// Customer sheet configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfiguration {
    /// Merchant name shown in mandates
    pub merchant_display_name: String,

    /// Offer Google Pay when the device is ready for it
    #[serde(default)]
    pub google_pay_enabled: bool,

    /// Title of the selection screen
    #[serde(default)]
    pub header_text_for_selection_screen: Option<String>,

    /// Whether the customer may remove their only saved method
    #[serde(default = "default_true")]
    pub allows_removal_of_last_saved_payment_method: bool,

    /// Preferred ordering of payment method types in the add form
    #[serde(default)]
    pub payment_method_order: Vec<String>,

    /// Preferred networks for co-branded cards
    #[serde(default)]
    pub preferred_networks: Vec<CardBrand>,

    /// Milliseconds to wait for the customer backend to be provided
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,

    /// Milliseconds between an edit-screen removal and the list update
    #[serde(default = "default_removal_delay_ms")]
    pub removal_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_backend_timeout_ms() -> u64 {
    DEFAULT_BACKEND_TIMEOUT_MS
}

fn default_removal_delay_ms() -> u64 {
    DEFAULT_REMOVAL_DELAY_MS
}

impl SheetConfiguration {
    /// Create a configuration with defaults for everything but the merchant name
    pub fn new(merchant_display_name: impl Into<String>) -> Self {
        Self {
            merchant_display_name: merchant_display_name.into(),
            google_pay_enabled: false,
            header_text_for_selection_screen: None,
            allows_removal_of_last_saved_payment_method: true,
            payment_method_order: Vec::new(),
            preferred_networks: Vec::new(),
            backend_timeout_ms: DEFAULT_BACKEND_TIMEOUT_MS,
            removal_delay_ms: DEFAULT_REMOVAL_DELAY_MS,
        }
    }

    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, SheetError> {
        toml::from_str(content)
            .map_err(|e| SheetError::Configuration(format!("Invalid sheet config: {}", e)))
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SheetError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SheetError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded sheet configuration from {}", path.display());
        Ok(config)
    }

    /// Builder: enable Google Pay
    pub fn with_google_pay(mut self, enabled: bool) -> Self {
        self.google_pay_enabled = enabled;
        self
    }

    /// Builder: set whether the last saved method can be removed
    pub fn with_allows_removal_of_last_saved_payment_method(mut self, allows: bool) -> Self {
        self.allows_removal_of_last_saved_payment_method = allows;
        self
    }

    /// Builder: set the preferred type order
    pub fn with_payment_method_order(mut self, order: &[&str]) -> Self {
        self.payment_method_order = order.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Builder: set the edit-screen removal delay
    pub fn with_removal_delay(mut self, delay: Duration) -> Self {
        self.removal_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Builder: set the backend resolution timeout
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn removal_delay(&self) -> Duration {
        Duration::from_millis(self.removal_delay_ms)
    }
}
