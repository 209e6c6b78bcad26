//! # Client-side Confirmation
//!
//! The default interceptor: a real setup intent is confirmed by the
//! confirmation UI with the new payment method. Deferred sessions carry no
//! intent to confirm, so they cannot be used for the setup-intent attach.

use async_trait::async_trait;
use sheet_core::{
    ConfirmSetupIntentParams, InitializationMode, IntentConfirmationInterceptor, NextStep,
    PaymentMethod, SheetError, GENERIC_ERROR_MESSAGE,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientSideConfirmation;

#[async_trait]
impl IntentConfirmationInterceptor for ClientSideConfirmation {
    async fn intercept(
        &self,
        mode: &InitializationMode,
        payment_method: &PaymentMethod,
        _options_params: Option<&serde_json::Value>,
        _shipping_values: Option<&serde_json::Value>,
    ) -> NextStep {
        match mode {
            InitializationMode::SetupIntent { client_secret } => {
                debug!(payment_method = %payment_method.id, "Confirming setup intent client-side");
                NextStep::Confirm(ConfirmSetupIntentParams {
                    client_secret: client_secret.clone(),
                    payment_method_id: payment_method.id.clone(),
                })
            }
            InitializationMode::DeferredSetup { .. } => NextStep::Fail {
                cause: SheetError::InvalidIntent(
                    "a deferred session has no setup intent to confirm".to_string(),
                ),
                message: GENERIC_ERROR_MESSAGE.to_string(),
            },
        }
    }
}
