//! # View Actions
//!
//! `ViewAction` is what the presentation layer dispatches.
//! `FlowMessage` is what background work reports back; the state machine
//! turns each one into a transition of its own.

use sheet_core::{
    AttachStyle, BackendFailure, BackendResult, BankAccountResult, CardBrand,
    ConfirmationOutcome, ConfirmationRequest, FormFieldValues, PaymentMethod,
    PaymentMethodCreateParams, PaymentSelection, SupportedPaymentMethod,
};

/// User intents dispatched by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAction {
    /// The host asked to close the sheet (scrim tap, swipe down)
    DismissRequested,
    /// The sheet was dismissed without asking
    Dismissed,
    BackPressed,
    AddPaymentMethodPressed,
    EditPressed,
    ItemSelected(PaymentSelection),
    ItemRemoved(PaymentMethod),
    ModifyItem(PaymentMethod),
    PrimaryButtonPressed,
    AddPaymentMethodItemChanged(SupportedPaymentMethod),
    /// `None` when the form became incomplete again
    FormFieldValuesCompleted(Option<FormFieldValues>),
    FormError(Option<String>),
    UpdateMandateText {
        text: Option<String>,
        show_above_primary_button: bool,
    },
    CollectBankAccountResult(BankAccountResult),
    ConfirmUsBankAccount(PaymentMethodCreateParams),
    /// Hide the dismiss confirmation modal
    CancelClose,
    /// Remove the method shown on the edit screen
    RemoveFromEditScreen,
    /// Change the preferred network of the card on the edit screen
    UpdateCardBrand(CardBrand),
}

/// Where a removal was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemovalSource {
    SelectScreen,
    EditScreen,
}

/// Completions of background work
#[derive(Debug)]
pub(crate) enum FlowMessage {
    SelectionPersisted {
        selection: Option<PaymentSelection>,
        result: BackendResult<()>,
    },
    Removed {
        payment_method: PaymentMethod,
        source: RemovalSource,
        result: BackendResult<PaymentMethod>,
    },
    RemovalDelayElapsed(PaymentMethod),
    Updated(BackendResult<PaymentMethod>),
    CreateFailed(BackendFailure),
    UnverifiedBankAccountCreated(PaymentMethod),
    Attached {
        payment_method: PaymentMethod,
        style: AttachStyle,
    },
    AttachFailed {
        failure: BackendFailure,
        style: AttachStyle,
    },
    ConfirmationRequired {
        payment_method: PaymentMethod,
        request: ConfirmationRequest,
    },
    ConfirmationFinished(ConfirmationOutcome),
}
