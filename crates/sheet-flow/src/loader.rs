//! # Sheet Loader
//!
//! Assembles one consistent `CustomerSheetState` from the customer backend,
//! the remote session and wallet readiness. Every step is sequential except
//! the two customer fetches, which run as independent tasks and are joined
//! before continuing. Any failure aborts the whole load.

use async_trait::async_trait;
use futures::StreamExt;
use sheet_core::{
    BackendResult, BackendSlot, BoxedCustomerBackend, CustomerSheetState, ErrorEvent,
    ErrorReporter, GooglePayEnvironment, InitializationMode, IntentSession,
    IntentSessionRepository, PaymentMethod, PaymentMethodMetadata, PaymentOption,
    PaymentSelection, SheetConfiguration, SheetError, SheetResult, SupportedPaymentMethod,
    TracingErrorReporter, WalletReadinessSource, CARD, US_BANK_ACCOUNT,
};
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, instrument};

/// Types that can be saved through the sheet
pub const SAVEABLE_PAYMENT_METHOD_TYPES: &[&str] = &[CARD, US_BANK_ACCOUNT];

/// Loads the state a sheet is seeded from.
#[async_trait]
pub trait SheetLoader: Send + Sync {
    async fn load(&self, configuration: &SheetConfiguration) -> SheetResult<CustomerSheetState>;
}

/// Loader backed by the real collaborators
pub struct DefaultSheetLoader {
    backend: BackendSlot,
    session_repository: Arc<dyn IntentSessionRepository>,
    wallet_readiness: Arc<dyn WalletReadinessSource>,
    error_reporter: Arc<dyn ErrorReporter>,
    is_live_mode: bool,
}

impl DefaultSheetLoader {
    pub fn new(
        backend: BackendSlot,
        session_repository: Arc<dyn IntentSessionRepository>,
        wallet_readiness: Arc<dyn WalletReadinessSource>,
    ) -> Self {
        Self {
            backend,
            session_repository,
            wallet_readiness,
            error_reporter: Arc::new(TracingErrorReporter),
            is_live_mode: false,
        }
    }

    /// Builder: report failures somewhere other than the log
    pub fn with_error_reporter(mut self, error_reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = error_reporter;
        self
    }

    /// Builder: check wallet readiness against production
    pub fn with_live_mode(mut self, is_live_mode: bool) -> Self {
        self.is_live_mode = is_live_mode;
        self
    }

    fn report(&self, event: ErrorEvent, cause: SheetError) -> SheetError {
        self.error_reporter.report(event, &cause);
        cause
    }

    async fn retrieve_session(&self, backend: &BoxedCustomerBackend) -> BackendResult<IntentSession> {
        let payment_method_types = if backend.can_create_setup_intents() {
            backend.payment_method_types().unwrap_or_default()
        } else {
            // Without setup intents only cards can be attached directly.
            vec![CARD.to_string()]
        };

        let mode = InitializationMode::DeferredSetup {
            payment_method_types,
        };
        self.session_repository.get(&mode, None, &[], None).await
    }

    async fn is_google_pay_ready(&self, configuration: &SheetConfiguration) -> bool {
        if !configuration.google_pay_enabled {
            return false;
        }
        let environment = GooglePayEnvironment::for_live_mode(self.is_live_mode);
        self.wallet_readiness
            .is_ready(environment)
            .next()
            .await
            .unwrap_or(false)
    }

    async fn load_payment_methods(
        &self,
        backend: &BoxedCustomerBackend,
    ) -> SheetResult<(Vec<PaymentMethod>, Option<PaymentOption>)> {
        let methods_task = AbortOnDropHandle::new(tokio::spawn({
            let backend = Arc::clone(backend);
            async move { backend.retrieve_payment_methods().await }
        }));
        let option_task = AbortOnDropHandle::new(tokio::spawn({
            let backend = Arc::clone(backend);
            async move { backend.retrieve_selected_option().await }
        }));

        let (methods, option) = tokio::join!(methods_task, option_task);

        let methods = methods.map_err(join_error)?.map_err(|f| f.cause)?;
        let option = option.map_err(join_error)?.map_err(|f| f.cause)?;
        Ok((methods, option))
    }
}

#[async_trait]
impl SheetLoader for DefaultSheetLoader {
    #[instrument(skip_all, fields(merchant = %configuration.merchant_display_name))]
    async fn load(&self, configuration: &SheetConfiguration) -> SheetResult<CustomerSheetState> {
        let backend = self
            .backend
            .resolve(configuration.backend_timeout())
            .await
            .map_err(|cause| self.report(ErrorEvent::DependencyUnavailable, cause))?;

        let session = self
            .retrieve_session(&backend)
            .await
            .map_err(|failure| self.report(ErrorEvent::SessionLoadFailure, failure.cause))?;

        let is_google_pay_ready = self.is_google_pay_ready(configuration).await;
        let metadata = PaymentMethodMetadata::create(&session, configuration, is_google_pay_ready);

        let (payment_methods, option) = self
            .load_payment_methods(&backend)
            .await
            .map_err(|cause| self.report(ErrorEvent::PaymentMethodsLoadFailure, cause))?;

        let payment_selection = option.and_then(|option| {
            option.to_selection(|id| payment_methods.iter().find(|pm| pm.id == id))
        });
        let saved_payment_methods = move_selected_first(payment_methods, payment_selection.as_ref());

        let supported_payment_methods =
            filter_saveable(metadata.sorted_supported_payment_methods());

        let validation_error = session.stripe_intent.validate();
        if let Some(cause) = &validation_error {
            self.error_reporter
                .report(ErrorEvent::ValidationFailure, cause);
        }

        info!(
            saved = saved_payment_methods.len(),
            supported = supported_payment_methods.len(),
            google_pay = metadata.is_google_pay_ready,
            "Loaded customer sheet state"
        );

        Ok(CustomerSheetState {
            config: configuration.clone(),
            metadata,
            supported_payment_methods,
            saved_payment_methods,
            payment_selection,
            validation_error,
        })
    }
}

/// Move the selected method to the front, keeping everything else in order.
pub fn move_selected_first(
    mut payment_methods: Vec<PaymentMethod>,
    selection: Option<&PaymentSelection>,
) -> Vec<PaymentMethod> {
    if let Some(selected) = selection.and_then(PaymentSelection::payment_method) {
        debug!(id = %selected.id, "Moving selected payment method first");
        // Stable: only the selected id sorts differently.
        payment_methods.sort_by_key(|pm| pm.id != selected.id);
    }
    payment_methods
}

fn filter_saveable(supported: &[SupportedPaymentMethod]) -> Vec<SupportedPaymentMethod> {
    supported
        .iter()
        .filter(|spm| SAVEABLE_PAYMENT_METHOD_TYPES.contains(&spm.code.as_str()))
        .cloned()
        .collect()
}

fn join_error(err: JoinError) -> SheetError {
    SheetError::Internal(format!("customer fetch task failed: {}", err))
}
