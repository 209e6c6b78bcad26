//! # Attach Sub-flow
//!
//! Turns completed form values into a payment method saved for the
//! customer. Runs off the state machine; every outcome comes back as a
//! single [`FlowMessage`].
//!
//! ```text
//! create ──► unverified bank account? ──► Selected
//!    │
//!    ├── no setup intents ──► attach ──► Attached / AttachFailed
//!    │
//!    └── setup intent secret ──► retrieve intent ──► intercept
//!                                       ├── Complete         ──► Attached
//!                                       ├── Confirm          ──► ConfirmationRequired
//!                                       ├── HandleNextAction ──► ConfirmationRequired
//!                                       └── Fail             ──► AttachFailed
//! ```

use crate::actions::FlowMessage;
use sheet_core::{
    AttachStyle, BackendFailure, BackendSlot, BoxedCustomerBackend, ConfirmationRequest,
    InitializationMode, IntentConfirmationInterceptor, NextStep, PaymentMethod,
    PaymentMethodCreateParams, PaymentsRepository,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Collaborators the sub-flow runs against
#[derive(Clone)]
pub(crate) struct AttachContext {
    pub backend: BackendSlot,
    pub payments: Arc<dyn PaymentsRepository>,
    pub interceptor: Arc<dyn IntentConfirmationInterceptor>,
    pub backend_timeout: Duration,
}

#[instrument(skip_all, fields(type_code = %params.type_code))]
pub(crate) async fn create_and_attach(
    ctx: AttachContext,
    params: PaymentMethodCreateParams,
) -> FlowMessage {
    let payment_method = match ctx.payments.create_payment_method(&params).await {
        Ok(payment_method) => payment_method,
        Err(failure) => return FlowMessage::CreateFailed(failure),
    };
    info!(id = %payment_method.id, "Created payment method");

    // Micro-deposit accounts cannot be attached until verified.
    if payment_method.is_unverified_us_bank_account() {
        return FlowMessage::UnverifiedBankAccountCreated(payment_method);
    }

    let backend = match ctx.backend.resolve(ctx.backend_timeout).await {
        Ok(backend) => backend,
        Err(cause) => {
            return FlowMessage::AttachFailed {
                failure: BackendFailure::new(cause),
                style: AttachStyle::CreateAttach,
            }
        }
    };

    if backend.can_create_setup_intents() {
        attach_with_setup_intent(&ctx, &backend, payment_method).await
    } else {
        attach_directly(&backend, payment_method).await
    }
}

async fn attach_directly(backend: &BoxedCustomerBackend, payment_method: PaymentMethod) -> FlowMessage {
    let style = AttachStyle::CreateAttach;
    match backend.attach_payment_method(&payment_method.id).await {
        Ok(attached) => FlowMessage::Attached {
            payment_method: attached,
            style,
        },
        Err(failure) => FlowMessage::AttachFailed { failure, style },
    }
}

async fn attach_with_setup_intent(
    ctx: &AttachContext,
    backend: &BoxedCustomerBackend,
    payment_method: PaymentMethod,
) -> FlowMessage {
    let style = AttachStyle::SetupIntent;

    let client_secret = match backend.setup_intent_client_secret_for_attach().await {
        Ok(client_secret) => client_secret,
        Err(failure) => return FlowMessage::AttachFailed { failure, style },
    };

    let intent = match ctx.payments.retrieve_setup_intent(&client_secret).await {
        Ok(intent) => intent,
        Err(failure) => return FlowMessage::AttachFailed { failure, style },
    };
    if let Some(cause) = intent.validate() {
        return FlowMessage::AttachFailed {
            failure: BackendFailure::new(cause),
            style,
        };
    }
    debug!(intent = ?intent.id, status = ?intent.status, "Retrieved setup intent");

    let mode = InitializationMode::SetupIntent { client_secret };
    match ctx
        .interceptor
        .intercept(&mode, &payment_method, None, None)
        .await
    {
        NextStep::Complete => FlowMessage::Attached {
            payment_method,
            style,
        },
        NextStep::Confirm(params) => FlowMessage::ConfirmationRequired {
            payment_method,
            request: ConfirmationRequest::Confirm(params),
        },
        NextStep::HandleNextAction { client_secret } => FlowMessage::ConfirmationRequired {
            payment_method,
            request: ConfirmationRequest::HandleNextAction { client_secret },
        },
        NextStep::Fail { cause, message } => FlowMessage::AttachFailed {
            failure: BackendFailure::new(cause).with_display_message(message),
            style,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        card, failure, unverified_bank_account, BackendCall, FakeBackend, FakeInterceptor,
        FakePayments,
    };
    use sheet_core::{CardBrand, ConfirmSetupIntentParams, IntentStatus, SheetError};

    fn context(
        backend: Arc<FakeBackend>,
        payments: FakePayments,
        interceptor: Arc<FakeInterceptor>,
    ) -> AttachContext {
        AttachContext {
            backend: BackendSlot::with_backend(backend),
            payments: Arc::new(payments),
            interceptor,
            backend_timeout: Duration::from_secs(5),
        }
    }

    fn params() -> PaymentMethodCreateParams {
        PaymentMethodCreateParams::new("card").with_field("card[number]", "4242424242424242")
    }

    #[tokio::test]
    async fn test_attaches_directly_without_setup_intents() {
        let backend = Arc::new(FakeBackend::new(vec![]));
        let interceptor = Arc::new(FakeInterceptor::returning(NextStep::Complete));
        let ctx = context(backend.clone(), FakePayments::creating(card("pm_new")), interceptor.clone());

        let message = create_and_attach(ctx, params()).await;

        match message {
            FlowMessage::Attached {
                payment_method,
                style,
            } => {
                assert_eq!(payment_method.id, "pm_new");
                assert_eq!(style, AttachStyle::CreateAttach);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(backend.calls(), vec![BackendCall::Attach("pm_new".into())]);
        assert!(interceptor.modes().is_empty());
    }

    #[tokio::test]
    async fn test_direct_attach_reports_the_attached_record() {
        let attached = PaymentMethod::card("pm_new", CardBrand::Mastercard, "4444");
        let backend = Arc::new(FakeBackend::new(vec![]).attaching_as(attached.clone()));
        let interceptor = Arc::new(FakeInterceptor::returning(NextStep::Complete));
        let ctx = context(backend, FakePayments::creating(card("pm_new")), interceptor);

        match create_and_attach(ctx, params()).await {
            FlowMessage::Attached { payment_method, .. } => assert_eq!(payment_method, attached),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_direct_attach_failure_keeps_display_message() {
        let backend = Arc::new(FakeBackend::new(vec![]).failing_attach(failure("Card declined")));
        let interceptor = Arc::new(FakeInterceptor::returning(NextStep::Complete));
        let ctx = context(backend, FakePayments::creating(card("pm_new")), interceptor);

        match create_and_attach(ctx, params()).await {
            FlowMessage::AttachFailed { failure, style } => {
                assert_eq!(failure.message_or_fallback(), "Card declined");
                assert_eq!(style, AttachStyle::CreateAttach);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_failure() {
        let backend = Arc::new(FakeBackend::new(vec![]));
        let interceptor = Arc::new(FakeInterceptor::returning(NextStep::Complete));
        let ctx = context(
            backend.clone(),
            FakePayments::failing_create(failure("Invalid card number")),
            interceptor,
        );

        assert!(matches!(
            create_and_attach(ctx, params()).await,
            FlowMessage::CreateFailed(_)
        ));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unverified_bank_account_is_not_attached() {
        let backend = Arc::new(FakeBackend::new(vec![]).with_setup_intents("seti_1_secret_x"));
        let interceptor = Arc::new(FakeInterceptor::returning(NextStep::Complete));
        let ctx = context(
            backend.clone(),
            FakePayments::creating(unverified_bank_account("pm_bank")),
            interceptor,
        );

        match create_and_attach(ctx, params()).await {
            FlowMessage::UnverifiedBankAccountCreated(pm) => assert_eq!(pm.id, "pm_bank"),
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_setup_intent_complete() {
        let backend = Arc::new(FakeBackend::new(vec![]).with_setup_intents("seti_1_secret_x"));
        let interceptor = Arc::new(FakeInterceptor::returning(NextStep::Complete));
        let ctx = context(backend.clone(), FakePayments::creating(card("pm_new")), interceptor.clone());

        assert!(matches!(
            create_and_attach(ctx, params()).await,
            FlowMessage::Attached {
                style: AttachStyle::SetupIntent,
                ..
            }
        ));
        assert_eq!(backend.calls(), vec![BackendCall::SetupIntentSecret]);
        assert_eq!(
            interceptor.modes(),
            vec![InitializationMode::SetupIntent {
                client_secret: "seti_1_secret_x".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_setup_intent_needs_confirmation() {
        let backend = Arc::new(FakeBackend::new(vec![]).with_setup_intents("seti_1_secret_x"));
        let confirm = ConfirmSetupIntentParams {
            client_secret: "seti_1_secret_x".into(),
            payment_method_id: "pm_new".into(),
        };
        let interceptor = Arc::new(FakeInterceptor::returning(NextStep::Confirm(confirm.clone())));
        let ctx = context(backend, FakePayments::creating(card("pm_new")), interceptor);

        match create_and_attach(ctx, params()).await {
            FlowMessage::ConfirmationRequired {
                payment_method,
                request,
            } => {
                assert_eq!(payment_method.id, "pm_new");
                assert_eq!(request, ConfirmationRequest::Confirm(confirm));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_setup_intent_next_action() {
        let backend = Arc::new(FakeBackend::new(vec![]).with_setup_intents("seti_1_secret_x"));
        let interceptor = Arc::new(FakeInterceptor::returning(NextStep::HandleNextAction {
            client_secret: "seti_1_secret_x".into(),
        }));
        let ctx = context(backend, FakePayments::creating(card("pm_new")), interceptor);

        assert!(matches!(
            create_and_attach(ctx, params()).await,
            FlowMessage::ConfirmationRequired {
                request: ConfirmationRequest::HandleNextAction { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_interceptor_failure_carries_message() {
        let backend = Arc::new(FakeBackend::new(vec![]).with_setup_intents("seti_1_secret_x"));
        let interceptor = Arc::new(FakeInterceptor::returning(NextStep::Fail {
            cause: SheetError::InvalidRequest("bad mandate".into()),
            message: "Something went wrong".into(),
        }));
        let ctx = context(backend, FakePayments::creating(card("pm_new")), interceptor);

        match create_and_attach(ctx, params()).await {
            FlowMessage::AttachFailed { failure, style } => {
                assert_eq!(failure.message_or_fallback(), "Something went wrong");
                assert_eq!(style, AttachStyle::SetupIntent);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_succeeded_setup_intent_is_rejected() {
        let backend = Arc::new(FakeBackend::new(vec![]).with_setup_intents("seti_1_secret_x"));
        let interceptor = Arc::new(FakeInterceptor::returning(NextStep::Complete));
        let mut intent = sheet_core::StripeIntent::deferred(vec!["card".into()], false);
        intent.id = Some("seti_1".into());
        intent.status = Some(IntentStatus::Succeeded);
        let payments = FakePayments::creating(card("pm_new")).with_setup_intent(Ok(intent));
        let ctx = context(backend, payments, interceptor.clone());

        assert!(matches!(
            create_and_attach(ctx, params()).await,
            FlowMessage::AttachFailed {
                style: AttachStyle::SetupIntent,
                ..
            }
        ));
        assert!(interceptor.modes().is_empty());
    }
}
