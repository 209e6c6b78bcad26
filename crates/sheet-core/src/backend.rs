//! # Customer Backend
//!
//! The merchant-provided client that owns the customer's saved payment
//! methods and their persisted selection.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              CustomerBackendClient (trait)                  │
//! │  ├── retrieve_payment_methods() / retrieve_selected_option()│
//! │  ├── set_selected_option()                                  │
//! │  ├── attach / detach / update_payment_method()              │
//! │  └── setup_intent_client_secret_for_attach()                │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!          ┌─────────────────┴─────────────────┐
//!  ┌───────┴──────────────┐          ┌─────────┴────────┐
//!  │ StripeCustomerBackend│          │  merchant-owned  │
//!  │   (sheet-stripe)     │          │   implementation │
//!  └──────────────────────┘          └──────────────────┘
//! ```
//!
//! The client is late-bound: hosts hand it to a [`BackendSlot`], and the
//! loader waits for it with a timeout.

use crate::error::{BackendResult, SheetError, SheetResult};
use crate::payment_method::{PaymentMethod, PaymentMethodUpdateParams};
use crate::selection::PaymentOption;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Customer-scoped operations the sheet delegates to the merchant.
#[async_trait]
pub trait CustomerBackendClient: Send + Sync {
    /// All payment methods saved for the customer
    async fn retrieve_payment_methods(&self) -> BackendResult<Vec<PaymentMethod>>;

    /// The persisted selection, if any
    async fn retrieve_selected_option(&self) -> BackendResult<Option<PaymentOption>>;

    /// Persist (or clear) the selection
    async fn set_selected_option(&self, option: Option<PaymentOption>) -> BackendResult<()>;

    /// Attach a payment method to the customer
    async fn attach_payment_method(&self, payment_method_id: &str) -> BackendResult<PaymentMethod>;

    /// Detach a payment method from the customer
    async fn detach_payment_method(&self, payment_method_id: &str) -> BackendResult<PaymentMethod>;

    /// Update a saved payment method (e.g. its preferred card network)
    async fn update_payment_method(
        &self,
        payment_method_id: &str,
        params: &PaymentMethodUpdateParams,
    ) -> BackendResult<PaymentMethod>;

    /// Client secret of a fresh setup intent used to attach a new method.
    ///
    /// Only called when [`Self::can_create_setup_intents`] is true.
    async fn setup_intent_client_secret_for_attach(&self) -> BackendResult<String>;

    /// Whether attaching goes through a setup intent
    fn can_create_setup_intents(&self) -> bool;

    /// Types the merchant allows saving; `None` means "whatever the session supports"
    fn payment_method_types(&self) -> Option<Vec<String>> {
        None
    }
}

/// Type alias for a shared customer backend (dynamic dispatch)
pub type BoxedCustomerBackend = Arc<dyn CustomerBackendClient>;

/// Late-bound holder for the customer backend.
///
/// The host calls [`BackendSlot::provide`] once the client exists; the
/// loader awaits it with [`BackendSlot::resolve`].
#[derive(Clone)]
pub struct BackendSlot {
    sender: Arc<watch::Sender<Option<BoxedCustomerBackend>>>,
}

impl BackendSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create a slot that already holds a client
    pub fn with_backend(backend: BoxedCustomerBackend) -> Self {
        let slot = Self::new();
        slot.provide(backend);
        slot
    }

    /// Make the backend available to waiting loaders
    pub fn provide(&self, backend: BoxedCustomerBackend) {
        self.sender.send_replace(Some(backend));
    }

    /// Check if a backend has been provided
    pub fn is_provided(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// Wait for the backend, failing once `timeout` elapses
    pub async fn resolve(&self, timeout: Duration) -> SheetResult<BoxedCustomerBackend> {
        let mut receiver = self.sender.subscribe();
        let wait = receiver.wait_for(|backend| backend.is_some());

        // Clone out of the watch guard so it is released before `receiver`.
        let resolved = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(backend)) => backend.clone(),
            Ok(Err(_)) | Err(_) => None,
        };

        resolved.ok_or_else(|| {
            SheetError::DependencyUnavailable(
                "Couldn't find an instance of CustomerBackendClient. \
                 Are you creating the sheet unconditionally in your app?"
                    .to_string(),
            )
        })
    }
}

impl Default for BackendSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendFailure;

    struct EmptyBackend;

    #[async_trait]
    impl CustomerBackendClient for EmptyBackend {
        async fn retrieve_payment_methods(&self) -> BackendResult<Vec<PaymentMethod>> {
            Ok(vec![])
        }
        async fn retrieve_selected_option(&self) -> BackendResult<Option<PaymentOption>> {
            Ok(None)
        }
        async fn set_selected_option(&self, _option: Option<PaymentOption>) -> BackendResult<()> {
            Ok(())
        }
        async fn attach_payment_method(&self, id: &str) -> BackendResult<PaymentMethod> {
            Ok(PaymentMethod::new(id, "card"))
        }
        async fn detach_payment_method(&self, id: &str) -> BackendResult<PaymentMethod> {
            Ok(PaymentMethod::new(id, "card"))
        }
        async fn update_payment_method(
            &self,
            id: &str,
            _params: &PaymentMethodUpdateParams,
        ) -> BackendResult<PaymentMethod> {
            Ok(PaymentMethod::new(id, "card"))
        }
        async fn setup_intent_client_secret_for_attach(&self) -> BackendResult<String> {
            Err(BackendFailure::new(SheetError::InvalidRequest("no setup intents".into())))
        }
        fn can_create_setup_intents(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_times_out() {
        let slot = BackendSlot::new();
        let result = slot.resolve(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(SheetError::DependencyUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_waits_for_late_backend() {
        let slot = BackendSlot::new();
        let provider = slot.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            provider.provide(Arc::new(EmptyBackend));
        });

        let backend = slot.resolve(Duration::from_secs(5)).await.unwrap();
        assert!(!backend.can_create_setup_intents());
        assert!(backend.payment_method_types().is_none());
        assert!(slot.is_provided());
    }

    #[tokio::test]
    async fn test_resolve_provided_backend() {
        let slot = BackendSlot::with_backend(Arc::new(EmptyBackend));
        let backend = slot.resolve(Duration::from_millis(1)).await.unwrap();
        assert!(backend.retrieve_payment_methods().await.unwrap().is_empty());
    }
}
