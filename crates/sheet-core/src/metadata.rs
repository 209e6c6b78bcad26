//! # Payment Method Metadata
//!
//! Immutable presentation metadata built once per load from the remote
//! session, the merchant configuration and wallet readiness.

use crate::config::SheetConfiguration;
use crate::intent::{IntentSession, StripeIntent};
use crate::payment_method::{CardBrand, CARD, US_BANK_ACCOUNT};
use serde::{Deserialize, Serialize};

/// A payment method type that can be added through the sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedPaymentMethod {
    pub code: String,
    pub display_name: String,
}

impl SupportedPaymentMethod {
    pub fn new(code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
        }
    }

    /// Built-in display name for a type the client knows how to render
    fn builtin(code: &str) -> Option<Self> {
        let display_name = match code {
            CARD => "Card",
            US_BANK_ACCOUNT => "US Bank Account",
            "sepa_debit" => "SEPA Debit",
            "bacs_debit" => "Bacs Direct Debit",
            "au_becs_debit" => "BECS Direct Debit",
            _ => return None,
        };
        Some(Self::new(code, display_name))
    }
}

/// Whether the customer can choose the network of co-branded cards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CardBrandChoiceEligibility {
    #[default]
    Ineligible,
    Eligible { preferred_networks: Vec<CardBrand> },
}

impl CardBrandChoiceEligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, CardBrandChoiceEligibility::Eligible { .. })
    }
}

/// Everything the screens need to know about the session.
///
/// Never mutated after [`PaymentMethodMetadata::create`]; a change
/// requires a full reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodMetadata {
    pub stripe_intent: StripeIntent,
    pub merchant_name: String,
    pub is_google_pay_ready: bool,
    pub cbc_eligibility: CardBrandChoiceEligibility,
    pub is_live_mode: bool,
    supported_payment_methods: Vec<SupportedPaymentMethod>,
}

impl PaymentMethodMetadata {
    /// Combine session, configuration and wallet readiness.
    ///
    /// `is_google_pay_ready` is the device's readiness; it only counts if
    /// the merchant enabled Google Pay.
    pub fn create(
        session: &IntentSession,
        configuration: &SheetConfiguration,
        is_google_pay_ready: bool,
    ) -> Self {
        let cbc_eligibility = if session.card_brand_choice_eligible {
            CardBrandChoiceEligibility::Eligible {
                preferred_networks: configuration.preferred_networks.clone(),
            }
        } else {
            CardBrandChoiceEligibility::Ineligible
        };

        let supported = session
            .stripe_intent
            .payment_method_types
            .iter()
            .filter_map(|code| {
                session
                    .payment_method_specs
                    .iter()
                    .find(|spec| &spec.type_code == code)
                    .and_then(|spec| spec.display_name.clone())
                    .map(|name| SupportedPaymentMethod::new(code.clone(), name))
                    .or_else(|| SupportedPaymentMethod::builtin(code))
            })
            .collect();

        Self {
            stripe_intent: session.stripe_intent.clone(),
            merchant_name: configuration.merchant_display_name.clone(),
            is_google_pay_ready: configuration.google_pay_enabled && is_google_pay_ready,
            cbc_eligibility,
            is_live_mode: session.is_live_mode,
            supported_payment_methods: sort_by_order(supported, &configuration.payment_method_order),
        }
    }

    /// Supported types, merchant order first, then server order
    pub fn sorted_supported_payment_methods(&self) -> &[SupportedPaymentMethod] {
        &self.supported_payment_methods
    }

    /// Type codes in display order
    pub fn supported_payment_method_types(&self) -> Vec<&str> {
        self.supported_payment_methods
            .iter()
            .map(|spm| spm.code.as_str())
            .collect()
    }

    pub fn supported_payment_method_for_code(&self, code: &str) -> Option<&SupportedPaymentMethod> {
        self.supported_payment_methods.iter().find(|spm| spm.code == code)
    }
}

/// Stable sort: codes named in `order` first (in that order), the rest after.
fn sort_by_order(
    mut methods: Vec<SupportedPaymentMethod>,
    order: &[String],
) -> Vec<SupportedPaymentMethod> {
    methods.sort_by_key(|spm| {
        order
            .iter()
            .position(|code| code == &spm.code)
            .unwrap_or(order.len())
    });
    methods
}
