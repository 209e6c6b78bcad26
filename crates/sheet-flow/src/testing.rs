//! In-memory collaborators for unit tests.

use crate::machine::{FlowCollaborators, ViewStateMachine};
use async_trait::async_trait;
use sheet_core::{
    AttachStyle, BackendFailure, BackendResult, BackendSlot, CardBrand, ConfirmationOutcome,
    ConfirmationRequest, ConfirmationUiLauncher, CustomerBackendClient, CustomerSheetState,
    ErrorEvent, ErrorReporter, EventReporter, InitializationMode, IntentConfirmationInterceptor,
    IntentSession, IntentSessionRepository, NextStep, PaymentMethod, PaymentMethodCreateParams,
    PaymentMethodMetadata, PaymentMethodUpdateParams, PaymentOption, PaymentSelection,
    PaymentsRepository, Screen, SheetConfiguration, SheetError, StripeIntent, UsBankAccount,
    US_BANK_ACCOUNT,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Barrier};

pub(crate) fn card(id: &str) -> PaymentMethod {
    PaymentMethod::card(id, CardBrand::Visa, "4242")
}

pub(crate) fn unverified_bank_account(id: &str) -> PaymentMethod {
    let mut method = PaymentMethod::new(id, US_BANK_ACCOUNT);
    method.us_bank_account = Some(UsBankAccount {
        bank_name: Some("STRIPE TEST BANK".into()),
        last4: "6789".into(),
        verified: false,
    });
    method
}

pub(crate) fn failure(message: &str) -> BackendFailure {
    BackendFailure::new(SheetError::ProviderError {
        provider: "test".into(),
        message: message.into(),
    })
    .with_display_message(message)
}

pub(crate) fn session_with_types(types: &[&str]) -> IntentSession {
    IntentSession {
        stripe_intent: StripeIntent::deferred(types.iter().map(|t| t.to_string()).collect(), false),
        payment_method_specs: vec![],
        card_brand_choice_eligible: false,
        is_live_mode: false,
    }
}

pub(crate) fn test_config() -> SheetConfiguration {
    SheetConfiguration::new("Merchant")
        .with_google_pay(true)
        .with_removal_delay(Duration::ZERO)
}

/// A loaded state as the loader would have produced it
pub(crate) fn loaded_state(
    config: &SheetConfiguration,
    saved_payment_methods: Vec<PaymentMethod>,
    payment_selection: Option<PaymentSelection>,
    is_google_pay_ready: bool,
) -> CustomerSheetState {
    let session = session_with_types(&["card", "us_bank_account"]);
    let metadata = PaymentMethodMetadata::create(&session, config, is_google_pay_ready);
    CustomerSheetState {
        config: config.clone(),
        supported_payment_methods: metadata.sorted_supported_payment_methods().to_vec(),
        metadata,
        saved_payment_methods,
        payment_selection,
        validation_error: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BackendCall {
    SetSelected(Option<PaymentOption>),
    Attach(String),
    Detach(String),
    Update(String, PaymentMethodUpdateParams),
    SetupIntentSecret,
}

pub(crate) struct FakeBackend {
    methods: BackendResult<Vec<PaymentMethod>>,
    selected_option: BackendResult<Option<PaymentOption>>,
    set_selected_failure: Option<BackendFailure>,
    attach_failure: Option<BackendFailure>,
    detach_failure: Option<BackendFailure>,
    update_failure: Option<BackendFailure>,
    hang_on_detach: bool,
    setup_intent_secret: Option<String>,
    payment_method_types: Option<Vec<String>>,
    attached: Option<PaymentMethod>,
    fetch_barrier: Option<Arc<Barrier>>,
    calls: Mutex<Vec<BackendCall>>,
}

impl FakeBackend {
    pub fn new(methods: Vec<PaymentMethod>) -> Self {
        Self {
            methods: Ok(methods),
            selected_option: Ok(None),
            set_selected_failure: None,
            attach_failure: None,
            detach_failure: None,
            update_failure: None,
            hang_on_detach: false,
            setup_intent_secret: None,
            payment_method_types: None,
            attached: None,
            fetch_barrier: None,
            calls: Mutex::new(vec![]),
        }
    }

    pub fn with_selected_option(mut self, option: Option<PaymentOption>) -> Self {
        self.selected_option = Ok(option);
        self
    }

    pub fn with_setup_intents(mut self, client_secret: &str) -> Self {
        self.setup_intent_secret = Some(client_secret.into());
        self
    }

    pub fn with_payment_method_types(mut self, types: &[&str]) -> Self {
        self.payment_method_types = Some(types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn failing_retrieve_methods(mut self, failure: BackendFailure) -> Self {
        self.methods = Err(failure);
        self
    }

    pub fn failing_retrieve_option(mut self, failure: BackendFailure) -> Self {
        self.selected_option = Err(failure);
        self
    }

    pub fn failing_set_selected(mut self, failure: BackendFailure) -> Self {
        self.set_selected_failure = Some(failure);
        self
    }

    pub fn failing_attach(mut self, failure: BackendFailure) -> Self {
        self.attach_failure = Some(failure);
        self
    }

    pub fn failing_detach(mut self, failure: BackendFailure) -> Self {
        self.detach_failure = Some(failure);
        self
    }

    pub fn failing_update(mut self, failure: BackendFailure) -> Self {
        self.update_failure = Some(failure);
        self
    }

    pub fn hanging_detach(mut self) -> Self {
        self.hang_on_detach = true;
        self
    }

    /// Attach returns `payment_method` instead of echoing the id
    pub fn attaching_as(mut self, payment_method: PaymentMethod) -> Self {
        self.attached = Some(payment_method);
        self
    }

    /// Both retrieve calls wait on `barrier` before answering
    pub fn with_fetch_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.fetch_barrier = Some(barrier);
        self
    }

    async fn wait_for_fetch_barrier(&self) {
        if let Some(barrier) = &self.fetch_barrier {
            barrier.wait().await;
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn fail_or<T>(failure: &Option<BackendFailure>, value: T) -> BackendResult<T> {
    match failure {
        Some(failure) => Err(failure.clone()),
        None => Ok(value),
    }
}

#[async_trait]
impl CustomerBackendClient for FakeBackend {
    async fn retrieve_payment_methods(&self) -> BackendResult<Vec<PaymentMethod>> {
        self.wait_for_fetch_barrier().await;
        self.methods.clone()
    }

    async fn retrieve_selected_option(&self) -> BackendResult<Option<PaymentOption>> {
        self.wait_for_fetch_barrier().await;
        self.selected_option.clone()
    }

    async fn set_selected_option(&self, option: Option<PaymentOption>) -> BackendResult<()> {
        self.record(BackendCall::SetSelected(option));
        fail_or(&self.set_selected_failure, ())
    }

    async fn attach_payment_method(&self, payment_method_id: &str) -> BackendResult<PaymentMethod> {
        self.record(BackendCall::Attach(payment_method_id.into()));
        let attached = self
            .attached
            .clone()
            .unwrap_or_else(|| card(payment_method_id));
        fail_or(&self.attach_failure, attached)
    }

    async fn detach_payment_method(&self, payment_method_id: &str) -> BackendResult<PaymentMethod> {
        self.record(BackendCall::Detach(payment_method_id.into()));
        if self.hang_on_detach {
            std::future::pending::<()>().await;
        }
        fail_or(&self.detach_failure, card(payment_method_id))
    }

    async fn update_payment_method(
        &self,
        payment_method_id: &str,
        params: &PaymentMethodUpdateParams,
    ) -> BackendResult<PaymentMethod> {
        self.record(BackendCall::Update(payment_method_id.into(), params.clone()));
        let preferred = params.preferred_network.map(|brand| brand.code());
        let updated = PaymentMethod::card(payment_method_id, CardBrand::CartesBancaires, "1001")
            .with_networks(&["cartes_bancaires", "visa"], preferred);
        fail_or(&self.update_failure, updated)
    }

    async fn setup_intent_client_secret_for_attach(&self) -> BackendResult<String> {
        self.record(BackendCall::SetupIntentSecret);
        self.setup_intent_secret.clone().ok_or_else(|| {
            BackendFailure::new(SheetError::InvalidRequest("no setup intents".into()))
        })
    }

    fn can_create_setup_intents(&self) -> bool {
        self.setup_intent_secret.is_some()
    }

    fn payment_method_types(&self) -> Option<Vec<String>> {
        self.payment_method_types.clone()
    }
}

pub(crate) struct FakeSessionRepository {
    result: BackendResult<IntentSession>,
    modes: Mutex<Vec<InitializationMode>>,
}

impl FakeSessionRepository {
    pub fn new(session: IntentSession) -> Self {
        Self {
            result: Ok(session),
            modes: Mutex::new(vec![]),
        }
    }

    pub fn failing(failure: BackendFailure) -> Self {
        Self {
            result: Err(failure),
            modes: Mutex::new(vec![]),
        }
    }

    pub fn requested_modes(&self) -> Vec<InitializationMode> {
        self.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentSessionRepository for FakeSessionRepository {
    async fn get(
        &self,
        mode: &InitializationMode,
        _customer_id: Option<&str>,
        _external_payment_methods: &[String],
        _default_payment_method_id: Option<&str>,
    ) -> BackendResult<IntentSession> {
        self.modes.lock().unwrap().push(mode.clone());
        self.result.clone()
    }
}

pub(crate) struct FakePayments {
    created: BackendResult<PaymentMethod>,
    setup_intent: BackendResult<StripeIntent>,
    create_params: Mutex<Vec<PaymentMethodCreateParams>>,
}

impl FakePayments {
    pub fn creating(payment_method: PaymentMethod) -> Self {
        Self {
            created: Ok(payment_method),
            setup_intent: Ok(StripeIntent {
                id: Some("seti_1".into()),
                client_secret: Some("seti_1_secret_x".into()),
                status: Some(sheet_core::IntentStatus::RequiresPaymentMethod),
                live_mode: false,
                payment_method_types: vec!["card".into()],
            }),
            create_params: Mutex::new(vec![]),
        }
    }

    pub fn failing_create(failure: BackendFailure) -> Self {
        Self {
            created: Err(failure),
            ..Self::creating(card("pm_unused"))
        }
    }

    pub fn with_setup_intent(mut self, intent: BackendResult<StripeIntent>) -> Self {
        self.setup_intent = intent;
        self
    }

    pub fn create_params(&self) -> Vec<PaymentMethodCreateParams> {
        self.create_params.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentsRepository for FakePayments {
    async fn create_payment_method(
        &self,
        params: &PaymentMethodCreateParams,
    ) -> BackendResult<PaymentMethod> {
        self.create_params.lock().unwrap().push(params.clone());
        self.created.clone()
    }

    async fn retrieve_setup_intent(&self, _client_secret: &str) -> BackendResult<StripeIntent> {
        self.setup_intent.clone()
    }
}

pub(crate) struct FakeInterceptor {
    next_step: NextStep,
    modes: Mutex<Vec<InitializationMode>>,
}

impl FakeInterceptor {
    pub fn returning(next_step: NextStep) -> Self {
        Self {
            next_step,
            modes: Mutex::new(vec![]),
        }
    }

    pub fn modes(&self) -> Vec<InitializationMode> {
        self.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentConfirmationInterceptor for FakeInterceptor {
    async fn intercept(
        &self,
        mode: &InitializationMode,
        _payment_method: &PaymentMethod,
        _options_params: Option<&serde_json::Value>,
        _shipping_values: Option<&serde_json::Value>,
    ) -> NextStep {
        self.modes.lock().unwrap().push(mode.clone());
        self.next_step.clone()
    }
}

/// Replies immediately with `outcome`, or holds the reply when `None`.
pub(crate) struct FakeLauncher {
    outcome: Option<ConfirmationOutcome>,
    requests: Mutex<Vec<ConfirmationRequest>>,
    pending: Mutex<Vec<oneshot::Sender<ConfirmationOutcome>>>,
}

impl FakeLauncher {
    pub fn replying(outcome: ConfirmationOutcome) -> Self {
        Self {
            outcome: Some(outcome),
            requests: Mutex::new(vec![]),
            pending: Mutex::new(vec![]),
        }
    }

    pub fn holding() -> Self {
        Self {
            outcome: None,
            requests: Mutex::new(vec![]),
            pending: Mutex::new(vec![]),
        }
    }

    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Drop every held reply without answering
    pub fn abandon(&self) {
        self.pending.lock().unwrap().clear();
    }
}

impl ConfirmationUiLauncher for FakeLauncher {
    fn launch(&self, request: ConfirmationRequest, reply: oneshot::Sender<ConfirmationOutcome>) {
        self.requests.lock().unwrap().push(request);
        match &self.outcome {
            Some(outcome) => {
                let _ = reply.send(outcome.clone());
            }
            None => self.pending.lock().unwrap().push(reply),
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingErrorReporter {
    events: Mutex<Vec<ErrorEvent>>,
}

impl RecordingErrorReporter {
    pub fn events(&self) -> Vec<ErrorEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingErrorReporter {
    fn report(&self, event: ErrorEvent, _cause: &SheetError) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recorded {
    Presented(Screen),
    Hidden(Screen),
    EditTapped,
    EditCompleted,
    TypeSelected(String),
    Removed(bool),
    Updated(bool),
    Attached(AttachStyle, bool),
    Confirmed(String, bool),
}

#[derive(Default)]
pub(crate) struct RecordingEventReporter {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingEventReporter {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: Recorded) {
        self.events.lock().unwrap().push(event);
    }
}

impl EventReporter for RecordingEventReporter {
    fn on_screen_presented(&self, screen: Screen) {
        self.record(Recorded::Presented(screen));
    }

    fn on_screen_hidden(&self, screen: Screen) {
        self.record(Recorded::Hidden(screen));
    }

    fn on_edit_tapped(&self) {
        self.record(Recorded::EditTapped);
    }

    fn on_edit_completed(&self) {
        self.record(Recorded::EditCompleted);
    }

    fn on_payment_method_type_selected(&self, code: &str) {
        self.record(Recorded::TypeSelected(code.into()));
    }

    fn on_remove_payment_method(&self, succeeded: bool) {
        self.record(Recorded::Removed(succeeded));
    }

    fn on_update_payment_method(&self, succeeded: bool) {
        self.record(Recorded::Updated(succeeded));
    }

    fn on_attach_payment_method(&self, style: AttachStyle, succeeded: bool) {
        self.record(Recorded::Attached(style, succeeded));
    }

    fn on_confirm_payment_method(&self, type_code: &str, succeeded: bool) {
        self.record(Recorded::Confirmed(type_code.into(), succeeded));
    }
}

/// Wires fakes into a state machine and keeps handles for assertions.
pub(crate) struct Harness {
    pub backend: Arc<FakeBackend>,
    pub payments: Arc<FakePayments>,
    pub interceptor: Arc<FakeInterceptor>,
    pub errors: Arc<RecordingErrorReporter>,
    pub events: Arc<RecordingEventReporter>,
    pub config: SheetConfiguration,
}

impl Harness {
    pub fn new(backend: FakeBackend) -> Self {
        Self {
            backend: Arc::new(backend),
            payments: Arc::new(FakePayments::creating(card("pm_new"))),
            interceptor: Arc::new(FakeInterceptor::returning(NextStep::Complete)),
            errors: Arc::default(),
            events: Arc::default(),
            config: test_config(),
        }
    }

    pub fn with_payments(mut self, payments: FakePayments) -> Self {
        self.payments = Arc::new(payments);
        self
    }

    pub fn with_interceptor(mut self, next_step: NextStep) -> Self {
        self.interceptor = Arc::new(FakeInterceptor::returning(next_step));
        self
    }

    pub fn with_config(mut self, config: SheetConfiguration) -> Self {
        self.config = config;
        self
    }

    pub fn collaborators(&self) -> FlowCollaborators {
        let backend: Arc<dyn CustomerBackendClient> = self.backend.clone();
        FlowCollaborators::new(
            BackendSlot::with_backend(backend),
            self.payments.clone(),
            self.interceptor.clone(),
        )
        .with_error_reporter(self.errors.clone())
        .with_event_reporter(self.events.clone())
    }

    pub fn machine(&self) -> ViewStateMachine {
        ViewStateMachine::new(self.config.clone(), self.collaborators(), false)
    }

    /// A machine seeded from a successful load
    pub fn loaded(
        &self,
        saved_payment_methods: Vec<PaymentMethod>,
        payment_selection: Option<PaymentSelection>,
        is_google_pay_ready: bool,
    ) -> ViewStateMachine {
        let mut machine = self.machine();
        machine.apply_loaded(Ok(loaded_state(
            &self.config,
            saved_payment_methods,
            payment_selection,
            is_google_pay_ready,
        )));
        machine
    }
}
