//! # sheet-stripe
//!
//! Stripe-backed collaborators for the customer payment-method sheet.
//!
//! 1. **StripeCustomerBackend** - `CustomerBackendClient` over the customer ephemeral key
//!    - List, attach, detach and update saved payment methods
//!    - Selection persisted through a `SelectedOptionStore`
//!    - Optional setup-intent attach via a `SetupIntentClientSecretProvider`
//!
//! 2. **StripeApiClient** - publishable-key client operations
//!    - `PaymentsRepository`: create payment methods, retrieve setup intents
//!    - `IntentSessionRepository`: load the elements session
//!
//! 3. **ClientSideConfirmation** - default `IntentConfirmationInterceptor`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sheet_stripe::{StripeApiClient, StripeCustomerBackend, StripeConfig};
//!
//! let config = StripeConfig::from_env()?;
//! let backend = StripeCustomerBackend::new(config.clone())?;
//! let api = Arc::new(StripeApiClient::new(config)?);
//!
//! let slot = BackendSlot::with_backend(Arc::new(backend));
//! let loader = DefaultSheetLoader::new(slot.clone(), api.clone(), wallet);
//! let collaborators = FlowCollaborators::new(slot, api, Arc::new(ClientSideConfirmation));
//! ```

pub mod api;
pub mod config;
pub mod customer;
mod http;
pub mod interceptor;
pub mod selection_store;

// Re-exports
pub use api::StripeApiClient;
pub use config::StripeConfig;
pub use customer::{SetupIntentClientSecretProvider, StripeCustomerBackend};
pub use interceptor::ClientSideConfirmation;
pub use selection_store::{InMemorySelectionStore, SelectedOptionStore};
