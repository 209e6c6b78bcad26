//! # sheet-core
//!
//! Core types and traits for the customer payment-method sheet.
//!
//! This crate provides:
//! - `CustomerBackendClient` and `BackendSlot` for the merchant's customer backend
//! - Collaborator traits: `IntentSessionRepository`, `PaymentsRepository`,
//!   `IntentConfirmationInterceptor`, `ConfirmationUiLauncher`, `WalletReadinessSource`
//! - `PaymentMethod`, `PaymentSelection` and `PaymentOption`
//! - `PaymentMethodMetadata` built from the remote session
//! - `ScreenState` and the persistent `BackStack`
//! - `CustomerSheetState` and `CustomerSheetResult`
//! - `SheetError` / `BackendFailure` for typed error handling
//! - `ErrorReporter` / `EventReporter` telemetry hooks
//!
//! ## Example
//!
//! ```rust,ignore
//! use sheet_core::{BackendSlot, SheetConfiguration};
//!
//! let config = SheetConfiguration::from_file("config/sheet.toml")?;
//!
//! // The host provides its customer backend whenever it becomes available
//! let slot = BackendSlot::new();
//! slot.provide(Arc::new(my_backend));
//!
//! // The loader waits for it
//! let backend = slot.resolve(config.backend_timeout()).await?;
//! ```

pub mod backend;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod intent;
pub mod metadata;
pub mod payment_method;
pub mod screen;
pub mod selection;
pub mod state;
pub mod telemetry;

// Re-exports for convenience
pub use backend::{BackendSlot, BoxedCustomerBackend, CustomerBackendClient};
pub use collaborators::{
    BoxedConfirmationLauncher, ConfirmSetupIntentParams, ConfirmationOutcome,
    ConfirmationRequest, ConfirmationUiLauncher, GooglePayEnvironment,
    IntentConfirmationInterceptor, IntentSessionRepository, NextStep, PaymentsRepository,
    StaticWalletReadiness, WalletReadinessSource,
};
pub use config::SheetConfiguration;
pub use error::{BackendFailure, BackendResult, SheetError, SheetResult, GENERIC_ERROR_MESSAGE};
pub use intent::{
    intent_id_from_client_secret, InitializationMode, IntentSession, IntentStatus,
    PaymentMethodSpec, StripeIntent,
};
pub use metadata::{CardBrandChoiceEligibility, PaymentMethodMetadata, SupportedPaymentMethod};
pub use payment_method::{
    Card, CardBrand, CardNetworks, PaymentMethod, PaymentMethodCreateParams,
    PaymentMethodUpdateParams, UsBankAccount, CARD, US_BANK_ACCOUNT,
};
pub use screen::{
    AddPaymentMethodState, BackStack, BankAccountResult, EditPaymentMethodState,
    FormFieldValues, PrimaryButtonLabel, ScreenState, SelectPaymentMethodState,
};
pub use selection::{PaymentOption, PaymentSelection};
pub use state::{CustomerSheetResult, CustomerSheetState};
pub use telemetry::{
    AttachStyle, ErrorEvent, ErrorReporter, EventReporter, Screen, TracingErrorReporter,
    TracingEventReporter,
};
