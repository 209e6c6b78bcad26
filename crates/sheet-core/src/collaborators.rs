//! # Collaborators
//!
//! External services the loader and the state machine call into:
//! the session repository, the payments API, the confirmation
//! interceptor, the confirmation UI and the wallet readiness source.

use crate::error::{BackendResult, SheetError};
use crate::intent::{IntentSession, InitializationMode, StripeIntent};
use crate::payment_method::{PaymentMethod, PaymentMethodCreateParams};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Fetches the remote session describing the intent.
#[async_trait]
pub trait IntentSessionRepository: Send + Sync {
    async fn get(
        &self,
        mode: &InitializationMode,
        customer_id: Option<&str>,
        external_payment_methods: &[String],
        default_payment_method_id: Option<&str>,
    ) -> BackendResult<IntentSession>;
}

/// Publishable-key operations against the payments API.
#[async_trait]
pub trait PaymentsRepository: Send + Sync {
    /// Create a payment method from completed form values
    async fn create_payment_method(
        &self,
        params: &PaymentMethodCreateParams,
    ) -> BackendResult<PaymentMethod>;

    /// Retrieve a setup intent by client secret
    async fn retrieve_setup_intent(&self, client_secret: &str) -> BackendResult<StripeIntent>;
}

/// Parameters for confirming a setup intent with a payment method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmSetupIntentParams {
    pub client_secret: String,
    pub payment_method_id: String,
}

/// What to do with a freshly created payment method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Already confirmed server-side
    Complete,
    /// Confirm the intent through the confirmation UI
    Confirm(ConfirmSetupIntentParams),
    /// Cannot proceed; `message` is shown to the customer
    Fail { cause: SheetError, message: String },
    /// The intent needs customer action (3-D Secure and friends)
    HandleNextAction { client_secret: String },
}

/// Decides how a created payment method gets confirmed.
#[async_trait]
pub trait IntentConfirmationInterceptor: Send + Sync {
    async fn intercept(
        &self,
        mode: &InitializationMode,
        payment_method: &PaymentMethod,
        options_params: Option<&serde_json::Value>,
        shipping_values: Option<&serde_json::Value>,
    ) -> NextStep;
}

/// What the confirmation UI was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationRequest {
    Confirm(ConfirmSetupIntentParams),
    HandleNextAction { client_secret: String },
}

/// How the confirmation UI finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Completed,
    Canceled,
    Failed(SheetError),
}

/// UI that confirms intents and runs next actions.
///
/// The launcher reports exactly once through `reply`. Dropping `reply`
/// without sending counts as a failure.
pub trait ConfirmationUiLauncher: Send + Sync {
    fn launch(&self, request: ConfirmationRequest, reply: oneshot::Sender<ConfirmationOutcome>);
}

/// Type alias for a shared confirmation launcher
pub type BoxedConfirmationLauncher = Arc<dyn ConfirmationUiLauncher>;

/// Environment the wallet is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GooglePayEnvironment {
    Production,
    Test,
}

impl GooglePayEnvironment {
    pub fn for_live_mode(is_live_mode: bool) -> Self {
        if is_live_mode {
            GooglePayEnvironment::Production
        } else {
            GooglePayEnvironment::Test
        }
    }
}

/// Reports whether the device's wallet can be used.
///
/// The stream is lazy; the loader only takes its first value.
pub trait WalletReadinessSource: Send + Sync {
    fn is_ready(&self, environment: GooglePayEnvironment) -> BoxStream<'static, bool>;
}

/// A readiness source with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct StaticWalletReadiness(pub bool);

impl WalletReadinessSource for StaticWalletReadiness {
    fn is_ready(&self, _environment: GooglePayEnvironment) -> BoxStream<'static, bool> {
        Box::pin(futures::stream::once(futures::future::ready(self.0)))
    }
}
