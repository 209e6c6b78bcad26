//! # Payment Method Types
//!
//! Saved payment instruments as returned by the backend, plus the
//! parameters used to create and update them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type code for cards
pub const CARD: &str = "card";
/// Type code for US bank accounts
pub const US_BANK_ACCOUNT: &str = "us_bank_account";

/// Card networks (brands)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    #[serde(rename = "amex")]
    AmericanExpress,
    Discover,
    Jcb,
    DinersClub,
    UnionPay,
    CartesBancaires,
    #[serde(other)]
    Unknown,
}

impl CardBrand {
    /// Network code as used by the Stripe API
    pub fn code(&self) -> &'static str {
        match self {
            CardBrand::Visa => "visa",
            CardBrand::Mastercard => "mastercard",
            CardBrand::AmericanExpress => "amex",
            CardBrand::Discover => "discover",
            CardBrand::Jcb => "jcb",
            CardBrand::DinersClub => "diners_club",
            CardBrand::UnionPay => "unionpay",
            CardBrand::CartesBancaires => "cartes_bancaires",
            CardBrand::Unknown => "unknown",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "visa" => CardBrand::Visa,
            "mastercard" => CardBrand::Mastercard,
            "amex" | "american_express" => CardBrand::AmericanExpress,
            "discover" => CardBrand::Discover,
            "jcb" => CardBrand::Jcb,
            "diners" | "diners_club" => CardBrand::DinersClub,
            "unionpay" => CardBrand::UnionPay,
            "cartes_bancaires" => CardBrand::CartesBancaires,
            _ => CardBrand::Unknown,
        }
    }
}

/// Networks a co-branded card can be routed through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardNetworks {
    #[serde(default)]
    pub available: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred: Option<String>,
}

/// Card display fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub brand: CardBrand,
    pub last4: String,
    #[serde(default)]
    pub exp_month: Option<u32>,
    #[serde(default)]
    pub exp_year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networks: Option<CardNetworks>,
}

impl Card {
    /// Card brand choice applies when more than one network is available
    pub fn is_co_branded(&self) -> bool {
        self.networks
            .as_ref()
            .map(|n| n.available.len() > 1)
            .unwrap_or(false)
    }
}

/// US bank account display fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsBankAccount {
    #[serde(default)]
    pub bank_name: Option<String>,
    pub last4: String,
    /// False while micro-deposit verification is pending
    #[serde(default = "default_true")]
    pub verified: bool,
}

fn default_true() -> bool {
    true
}

/// A saved payment method. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,

    /// Type code (e.g. "card", "us_bank_account")
    #[serde(rename = "type")]
    pub type_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default)]
    pub live_mode: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub us_bank_account: Option<UsBankAccount>,
}

impl PaymentMethod {
    /// Create a bare payment method of the given type
    pub fn new(id: impl Into<String>, type_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_code: type_code.into(),
            created: None,
            live_mode: false,
            card: None,
            us_bank_account: None,
        }
    }

    /// Create a card payment method
    pub fn card(id: impl Into<String>, brand: CardBrand, last4: impl Into<String>) -> Self {
        let mut method = Self::new(id, CARD);
        method.card = Some(Card {
            brand,
            last4: last4.into(),
            exp_month: None,
            exp_year: None,
            networks: None,
        });
        method
    }

    /// Builder: set the available networks for card brand choice
    pub fn with_networks(mut self, available: &[&str], preferred: Option<&str>) -> Self {
        if let Some(card) = self.card.as_mut() {
            card.networks = Some(CardNetworks {
                available: available.iter().map(|n| n.to_string()).collect(),
                preferred: preferred.map(String::from),
            });
        }
        self
    }

    pub fn is_card(&self) -> bool {
        self.type_code == CARD
    }

    /// A bank account still awaiting micro-deposit verification
    pub fn is_unverified_us_bank_account(&self) -> bool {
        self.type_code == US_BANK_ACCOUNT
            && self
                .us_bank_account
                .as_ref()
                .map(|account| !account.verified)
                .unwrap_or(false)
    }

    /// Whether the edit screen can change anything other than removal
    pub fn is_modifiable(&self) -> bool {
        self.card.as_ref().map(Card::is_co_branded).unwrap_or(false)
    }

    /// Short label for logs and edit screens (e.g. "visa •••• 4242")
    pub fn label(&self) -> String {
        match (&self.card, &self.us_bank_account) {
            (Some(card), _) => format!("{} •••• {}", card.brand.code(), card.last4),
            (None, Some(bank)) => format!(
                "{} •••• {}",
                bank.bank_name.as_deref().unwrap_or("bank"),
                bank.last4
            ),
            _ => self.type_code.clone(),
        }
    }
}

/// Parameters for creating a payment method from a completed form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodCreateParams {
    pub type_code: String,
    /// Form-encoded fields, keyed by their API name (e.g. "card[number]")
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl PaymentMethodCreateParams {
    pub fn new(type_code: impl Into<String>) -> Self {
        Self {
            type_code: type_code.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Parameters for updating a saved payment method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodUpdateParams {
    /// Preferred card network for co-branded cards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_network: Option<CardBrand>,
    /// Product usage tokens forwarded for attribution
    #[serde(default)]
    pub product_usage: Vec<String>,
}

impl PaymentMethodUpdateParams {
    /// Update the preferred network of a card
    pub fn preferred_network(brand: CardBrand) -> Self {
        Self {
            preferred_network: Some(brand),
            product_usage: vec!["CustomerSheet".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_brand_codes() {
        assert_eq!(CardBrand::from_code("amex"), CardBrand::AmericanExpress);
        assert_eq!(CardBrand::AmericanExpress.code(), "amex");
        assert_eq!(CardBrand::from_code("elo"), CardBrand::Unknown);
    }

    #[test]
    fn test_modifiable_requires_co_branding() {
        let plain = PaymentMethod::card("pm_1", CardBrand::Visa, "4242");
        assert!(!plain.is_modifiable());

        let co_branded = PaymentMethod::card("pm_2", CardBrand::CartesBancaires, "1001")
            .with_networks(&["cartes_bancaires", "visa"], None);
        assert!(co_branded.is_modifiable());
    }

    #[test]
    fn test_unverified_bank_account() {
        let mut method = PaymentMethod::new("pm_bank", US_BANK_ACCOUNT);
        method.us_bank_account = Some(UsBankAccount {
            bank_name: Some("STRIPE TEST BANK".into()),
            last4: "6789".into(),
            verified: false,
        });
        assert!(method.is_unverified_us_bank_account());
        assert_eq!(method.label(), "STRIPE TEST BANK •••• 6789");
    }

    #[test]
    fn test_deserialize_stripe_shape() {
        let json = r#"{
            "id": "pm_123",
            "type": "card",
            "live_mode": false,
            "card": { "brand": "visa", "last4": "4242", "exp_month": 12, "exp_year": 2030 }
        }"#;
        let method: PaymentMethod = serde_json::from_str(json).unwrap();
        assert_eq!(method.id, "pm_123");
        assert!(method.is_card());
        assert_eq!(method.card.unwrap().brand, CardBrand::Visa);
    }
}
