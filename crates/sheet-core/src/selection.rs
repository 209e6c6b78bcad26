//! # Payment Selection
//!
//! What the customer has chosen, and how that choice is persisted by the
//! customer backend.

use crate::payment_method::PaymentMethod;
use serde::{Deserialize, Serialize};

/// The payment method or wallet currently chosen.
///
/// Absence of a selection is modelled as `Option<PaymentSelection>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentSelection {
    /// A saved payment method
    Saved { payment_method: PaymentMethod },
    /// Google Pay
    GooglePay,
    /// Link. Never offered on this surface; selecting it is rejected.
    Link,
}

impl PaymentSelection {
    pub fn saved(payment_method: PaymentMethod) -> Self {
        PaymentSelection::Saved { payment_method }
    }

    /// The saved payment method behind this selection, if any
    pub fn payment_method(&self) -> Option<&PaymentMethod> {
        match self {
            PaymentSelection::Saved { payment_method } => Some(payment_method),
            _ => None,
        }
    }

    /// True if this selection is the saved method with the given id
    pub fn is_saved_with_id(&self, id: &str) -> bool {
        self.payment_method().map(|pm| pm.id == id).unwrap_or(false)
    }

    /// Type code reported to analytics
    pub fn type_code(&self) -> &str {
        match self {
            PaymentSelection::Saved { payment_method } => &payment_method.type_code,
            PaymentSelection::GooglePay => "google_pay",
            PaymentSelection::Link => "link",
        }
    }

    /// The value persisted by the customer backend
    pub fn to_payment_option(&self) -> PaymentOption {
        match self {
            PaymentSelection::Saved { payment_method } => {
                PaymentOption::StripeId(payment_method.id.clone())
            }
            PaymentSelection::GooglePay => PaymentOption::GooglePay,
            PaymentSelection::Link => PaymentOption::Link,
        }
    }
}

/// A persisted selection, as stored by the customer backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOption {
    GooglePay,
    Link,
    StripeId(String),
}

impl PaymentOption {
    /// Stable string form ("google_pay", "link" or the payment method id)
    pub fn id(&self) -> &str {
        match self {
            PaymentOption::GooglePay => "google_pay",
            PaymentOption::Link => "link",
            PaymentOption::StripeId(id) => id,
        }
    }

    pub fn from_id(id: &str) -> Self {
        match id {
            "google_pay" => PaymentOption::GooglePay,
            "link" => PaymentOption::Link,
            other => PaymentOption::StripeId(other.to_string()),
        }
    }

    /// Resolve against the saved methods.
    ///
    /// A stale id with no matching saved method resolves to `None`.
    pub fn to_selection<'a>(
        &self,
        lookup: impl Fn(&str) -> Option<&'a PaymentMethod>,
    ) -> Option<PaymentSelection> {
        match self {
            PaymentOption::GooglePay => Some(PaymentSelection::GooglePay),
            PaymentOption::Link => Some(PaymentSelection::Link),
            PaymentOption::StripeId(id) => lookup(id).cloned().map(PaymentSelection::saved),
        }
    }
}
