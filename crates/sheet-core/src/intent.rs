//! # Intent Types
//!
//! The setup intent behind a customer sheet session and the remote
//! "elements session" that describes it.

use crate::error::SheetError;
use serde::{Deserialize, Serialize};

/// Setup intent status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
}

/// How the session's intent is initialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InitializationMode {
    /// No intent exists yet; saving is described by allowed types only
    DeferredSetup { payment_method_types: Vec<String> },
    /// A real setup intent created by the merchant backend
    SetupIntent { client_secret: String },
}

/// A setup intent (or the synthetic intent of a deferred session)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeIntent {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    /// Absent for deferred intents
    #[serde(default)]
    pub status: Option<IntentStatus>,

    #[serde(default, rename = "livemode")]
    pub live_mode: bool,

    #[serde(default)]
    pub payment_method_types: Vec<String>,
}

impl StripeIntent {
    /// Synthetic intent for a deferred setup session
    pub fn deferred(payment_method_types: Vec<String>, live_mode: bool) -> Self {
        Self {
            id: None,
            client_secret: None,
            status: None,
            live_mode,
            payment_method_types,
        }
    }

    /// Check the intent can still be used to save a payment method.
    ///
    /// Returns the validation error rather than failing, so that callers
    /// can carry it in a loaded state.
    pub fn validate(&self) -> Option<SheetError> {
        match self.status {
            Some(IntentStatus::Succeeded) => Some(SheetError::InvalidIntent(format!(
                "SetupIntent {} has already succeeded",
                self.id.as_deref().unwrap_or("(deferred)")
            ))),
            Some(IntentStatus::Canceled) => Some(SheetError::InvalidIntent(format!(
                "SetupIntent {} has been canceled",
                self.id.as_deref().unwrap_or("(deferred)")
            ))),
            _ => None,
        }
    }
}

/// Extract the setup intent id from its client secret
/// (`seti_123_secret_abc` → `seti_123`).
pub fn intent_id_from_client_secret(client_secret: &str) -> Option<&str> {
    client_secret
        .split_once("_secret_")
        .map(|(id, _)| id)
        .filter(|id| !id.is_empty())
}

/// Server-provided description of a payment method type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodSpec {
    #[serde(rename = "type")]
    pub type_code: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// The remote bundle describing the intent and supported methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSession {
    pub stripe_intent: StripeIntent,

    #[serde(default)]
    pub payment_method_specs: Vec<PaymentMethodSpec>,

    #[serde(default)]
    pub card_brand_choice_eligible: bool,

    #[serde(default)]
    pub is_live_mode: bool,
}
