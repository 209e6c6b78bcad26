//! # Sheet State and Result
//!
//! The snapshot produced by the loader and the single terminal result the
//! flow hands back to the host.

use crate::config::SheetConfiguration;
use crate::error::SheetError;
use crate::metadata::{PaymentMethodMetadata, SupportedPaymentMethod};
use crate::payment_method::PaymentMethod;
use crate::selection::PaymentSelection;

/// Everything the state machine needs to seed its screens.
///
/// Produced once per load and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSheetState {
    pub config: SheetConfiguration,
    pub metadata: PaymentMethodMetadata,
    /// Types that can be added, already filtered to what can be saved
    pub supported_payment_methods: Vec<SupportedPaymentMethod>,
    /// Saved methods, selected one first
    pub saved_payment_methods: Vec<PaymentMethod>,
    pub payment_selection: Option<PaymentSelection>,
    /// Set when the intent cannot be used; the flow must end with an error
    pub validation_error: Option<SheetError>,
}

impl CustomerSheetState {
    /// Whether the flow should open on the add form
    pub fn starts_with_add_form(&self) -> bool {
        self.saved_payment_methods.is_empty() && !self.metadata.is_google_pay_ready
    }
}

/// Terminal output of a sheet invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerSheetResult {
    /// Dismissed; carries the selection from before the flow
    Canceled(Option<PaymentSelection>),
    /// The customer confirmed a selection (possibly none)
    Selected(Option<PaymentSelection>),
    /// The flow could not run
    Error(SheetError),
}

impl CustomerSheetResult {
    pub fn is_error(&self) -> bool {
        matches!(self, CustomerSheetResult::Error(_))
    }
}
