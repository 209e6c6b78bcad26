//! # View State Machine
//!
//! Owns the back-stack and every other piece of mutable flow state.
//!
//! Actions from the host are applied synchronously by
//! [`ViewStateMachine::handle_action`]. Anything that suspends (backend
//! calls, the confirmation UI, the removal delay) runs as a task on the
//! machine's tracker and reports back through a [`FlowMessage`], which is
//! applied by the same single writer. All tasks stop when the flow is
//! closed.

use crate::actions::{FlowMessage, RemovalSource, ViewAction};
use crate::attach::{self, AttachContext};
use sheet_core::{
    AddPaymentMethodState, AttachStyle, BackStack, BackendFailure, BackendResult, BackendSlot,
    BankAccountResult, BoxedConfirmationLauncher, CardBrand, CardBrandChoiceEligibility,
    ConfirmationOutcome, CustomerSheetResult, CustomerSheetState, EditPaymentMethodState,
    ErrorEvent, ErrorReporter, EventReporter, IntentConfirmationInterceptor, PaymentMethod,
    PaymentMethodCreateParams, PaymentMethodMetadata, PaymentMethodUpdateParams,
    PaymentSelection, PaymentsRepository, PrimaryButtonLabel, ScreenState,
    SelectPaymentMethodState, SheetConfiguration, SheetError, SheetResult,
    SupportedPaymentMethod, TracingErrorReporter, TracingEventReporter, CARD, US_BANK_ACCOUNT,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Collaborators the state machine calls into
#[derive(Clone)]
pub struct FlowCollaborators {
    pub backend: BackendSlot,
    pub payments: Arc<dyn PaymentsRepository>,
    pub interceptor: Arc<dyn IntentConfirmationInterceptor>,
    pub error_reporter: Arc<dyn ErrorReporter>,
    pub event_reporter: Arc<dyn EventReporter>,
}

impl FlowCollaborators {
    /// Collaborators that report through `tracing`
    pub fn new(
        backend: BackendSlot,
        payments: Arc<dyn PaymentsRepository>,
        interceptor: Arc<dyn IntentConfirmationInterceptor>,
    ) -> Self {
        Self {
            backend,
            payments,
            interceptor,
            error_reporter: Arc::new(TracingErrorReporter),
            event_reporter: Arc::new(TracingEventReporter),
        }
    }

    pub fn with_error_reporter(mut self, error_reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = error_reporter;
        self
    }

    pub fn with_event_reporter(mut self, event_reporter: Arc<dyn EventReporter>) -> Self {
        self.event_reporter = event_reporter;
        self
    }
}

/// Registration point for the host's confirmation UI.
///
/// The machine looks the launcher up each time it needs one, so the host
/// may register it after the flow has started.
#[derive(Clone)]
pub struct LauncherRegistration {
    sender: Arc<watch::Sender<Option<BoxedConfirmationLauncher>>>,
}

impl LauncherRegistration {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn register(&self, launcher: BoxedConfirmationLauncher) {
        self.sender.send_replace(Some(launcher));
    }

    pub fn unregister(&self) {
        self.sender.send_replace(None);
    }

    pub fn is_registered(&self) -> bool {
        self.sender.borrow().is_some()
    }

    fn current(&self) -> Option<BoxedConfirmationLauncher> {
        self.sender.borrow().clone()
    }
}

impl Default for LauncherRegistration {
    fn default() -> Self {
        Self::new()
    }
}

/// The flow's single writer.
pub struct ViewStateMachine {
    configuration: SheetConfiguration,
    collaborators: FlowCollaborators,
    launcher: LauncherRegistration,

    stack: BackStack,
    stack_tx: watch::Sender<BackStack>,
    result: Option<CustomerSheetResult>,

    metadata: Option<PaymentMethodMetadata>,
    supported_payment_methods: Vec<SupportedPaymentMethod>,
    original_selection: Option<PaymentSelection>,
    /// Sticky add-form type
    previously_selected: Option<SupportedPaymentMethod>,
    /// Created and waiting on the confirmation UI
    unconfirmed_payment_method: Option<PaymentMethod>,

    messages_tx: mpsc::UnboundedSender<FlowMessage>,
    messages_rx: mpsc::UnboundedReceiver<FlowMessage>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl ViewStateMachine {
    /// A machine showing the loading screen
    pub fn new(
        configuration: SheetConfiguration,
        collaborators: FlowCollaborators,
        is_live_mode: bool,
    ) -> Self {
        let stack = BackStack::new(ScreenState::Loading { is_live_mode });
        let (stack_tx, _) = watch::channel(stack.clone());
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();

        Self {
            configuration,
            collaborators,
            launcher: LauncherRegistration::new(),
            stack,
            stack_tx,
            result: None,
            metadata: None,
            supported_payment_methods: Vec::new(),
            original_selection: None,
            previously_selected: None,
            unconfirmed_payment_method: None,
            messages_tx,
            messages_rx,
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Builder: share a launcher registration with the host
    pub fn with_launcher_registration(mut self, launcher: LauncherRegistration) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<BackStack> {
        self.stack_tx.subscribe()
    }

    pub fn back_stack(&self) -> &BackStack {
        &self.stack
    }

    pub fn current_screen(&self) -> &ScreenState {
        self.stack.current()
    }

    pub fn result(&self) -> Option<&CustomerSheetResult> {
        self.result.as_ref()
    }

    pub fn original_selection(&self) -> Option<&PaymentSelection> {
        self.original_selection.as_ref()
    }

    pub fn launcher_registration(&self) -> LauncherRegistration {
        self.launcher.clone()
    }

    /// Token cancelled when the flow is torn down
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Seed the screens from a load, or end the flow if it failed.
    pub fn apply_loaded(&mut self, loaded: SheetResult<CustomerSheetState>) {
        let state = match loaded {
            Ok(state) => state,
            Err(cause) => return self.finish(CustomerSheetResult::Error(cause)),
        };
        let starts_with_add_form = state.starts_with_add_form();
        if let Some(cause) = state.validation_error {
            return self.finish(CustomerSheetResult::Error(cause));
        }

        self.original_selection = state.payment_selection.clone();
        self.supported_payment_methods = state.supported_payment_methods;
        self.metadata = Some(state.metadata);

        if starts_with_add_form {
            self.transition_to_add_payment_method(true);
        } else {
            let mut select = SelectPaymentMethodState {
                saved_payment_methods: state.saved_payment_methods,
                payment_selection: state.payment_selection,
                ..self.default_select_state()
            };
            select.can_remove_payment_methods = select.can_edit();
            self.transition(ScreenState::SelectPaymentMethod(select), true);
        }
    }

    /// Apply one host action.
    ///
    /// Fails for actions the current screen cannot take and for anything
    /// after the result was emitted.
    pub fn handle_action(&mut self, action: ViewAction) -> SheetResult<()> {
        if self.result.is_some() {
            return Err(SheetError::InvalidRequest(
                "the sheet has already produced a result".to_string(),
            ));
        }
        if matches!(self.stack.current(), ScreenState::Loading { .. })
            && !matches!(
                action,
                ViewAction::Dismissed | ViewAction::DismissRequested | ViewAction::BackPressed
            )
        {
            return Err(SheetError::InvalidRequest("the sheet is still loading".to_string()));
        }

        debug!(?action, "Handling view action");
        match action {
            ViewAction::DismissRequested => self.on_dismiss_requested(),
            ViewAction::Dismissed => self.on_dismissed(),
            ViewAction::BackPressed => self.on_back_pressed(),
            ViewAction::AddPaymentMethodPressed => self.transition_to_add_payment_method(false),
            ViewAction::EditPressed => self.on_edit_pressed(),
            ViewAction::ItemSelected(selection) => return self.on_item_selected(selection),
            ViewAction::ItemRemoved(payment_method) => {
                self.detach(payment_method, RemovalSource::SelectScreen)
            }
            ViewAction::ModifyItem(payment_method) => self.on_modify_item(payment_method),
            ViewAction::PrimaryButtonPressed => return self.on_primary_button_pressed(),
            ViewAction::AddPaymentMethodItemChanged(supported) => {
                self.on_add_payment_method_item_changed(supported)
            }
            ViewAction::FormFieldValuesCompleted(values) => {
                let next = self.stack.map_add(|s| {
                    let mut add = AddPaymentMethodState {
                        form_field_values: values.clone(),
                        ..s.clone()
                    };
                    add.primary_button_enabled = add.computed_primary_button_enabled();
                    add
                });
                self.publish(next);
            }
            ViewAction::FormError(message) => {
                let next = self.stack.map_add(|s| AddPaymentMethodState {
                    error_message: message.clone(),
                    ..s.clone()
                });
                self.publish(next);
            }
            ViewAction::UpdateMandateText {
                text,
                show_above_primary_button,
            } => {
                let next = self.stack.map_add(|s| AddPaymentMethodState {
                    mandate_text: text.clone(),
                    show_mandate_above_primary_button: show_above_primary_button,
                    ..s.clone()
                });
                self.publish(next);
            }
            ViewAction::CollectBankAccountResult(result) => {
                let next = self.stack.map_add(|s| AddPaymentMethodState {
                    primary_button_label: add_form_label(&s.payment_method_code, Some(&result)),
                    bank_account_result: Some(result.clone()),
                    ..s.clone()
                });
                self.publish(next);
            }
            ViewAction::ConfirmUsBankAccount(params) => {
                let Some(add) = self.stack.current().as_add() else {
                    return Err(SheetError::InvalidRequest(
                        "bank accounts are confirmed from the add screen".to_string(),
                    ));
                };
                if add.is_processing {
                    return Ok(());
                }
                self.create_and_attach(params);
            }
            ViewAction::CancelClose => {
                let next = self.stack.map_add(|s| AddPaymentMethodState {
                    display_dismiss_confirmation_modal: false,
                    ..s.clone()
                });
                self.publish(next);
            }
            ViewAction::RemoveFromEditScreen => self.on_remove_from_edit_screen(),
            ViewAction::UpdateCardBrand(brand) => self.on_update_card_brand(brand),
        }
        Ok(())
    }

    /// Whether a dismiss request may close the sheet right away.
    ///
    /// A collected bank account that has not been saved yet asks first.
    pub fn should_dismiss(&self) -> bool {
        match self.stack.current().as_add() {
            Some(add) => !(add.payment_method_code == US_BANK_ACCOUNT
                && matches!(add.bank_account_result, Some(BankAccountResult::Completed { .. }))),
            None => true,
        }
    }

    /// Wait for the next background completion and apply it.
    ///
    /// Returns false once the flow has been cancelled.
    pub async fn process_next_message(&mut self) -> bool {
        let message = tokio::select! {
            _ = self.cancel.cancelled() => None,
            message = self.messages_rx.recv() => message,
        };
        match message {
            Some(message) => {
                self.handle_message(message);
                true
            }
            None => false,
        }
    }

    /// Drive the flow until it produces a result or is torn down.
    pub async fn run(
        mut self,
        mut actions: mpsc::UnboundedReceiver<ViewAction>,
    ) -> CustomerSheetResult {
        while self.result.is_none() {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(message) = self.messages_rx.recv() => self.handle_message(message),
                action = actions.recv() => match action {
                    Some(action) => {
                        if let Err(err) = self.handle_action(action) {
                            warn!(error = %err, "Rejected view action");
                        }
                    }
                    None => break,
                },
            }
        }
        self.close()
    }

    /// Tear the flow down and return its result.
    ///
    /// Outstanding work is cancelled and the confirmation UI released.
    /// Without an emitted result the flow counts as canceled.
    pub fn close(&mut self) -> CustomerSheetResult {
        self.cancel.cancel();
        self.tasks.close();
        self.launcher.unregister();
        self.unconfirmed_payment_method = None;

        self.result
            .clone()
            .unwrap_or_else(|| CustomerSheetResult::Canceled(self.original_selection.clone()))
    }

    pub(crate) fn handle_message(&mut self, message: FlowMessage) {
        if self.result.is_some() {
            debug!(?message, "Ignoring completion after result");
            return;
        }

        match message {
            FlowMessage::SelectionPersisted { selection, result } => {
                self.on_selection_persisted(selection, result)
            }
            FlowMessage::Removed {
                payment_method,
                source,
                result,
            } => self.on_removed(payment_method, source, result),
            FlowMessage::RemovalDelayElapsed(payment_method) => {
                self.remove_from_state(&payment_method)
            }
            FlowMessage::Updated(result) => self.on_updated(result),
            FlowMessage::CreateFailed(failure) => {
                self.report(ErrorEvent::CreateFailure, &failure.cause);
                self.on_add_failed(failure.message_or_fallback());
            }
            FlowMessage::UnverifiedBankAccountCreated(payment_method) => {
                info!(id = %payment_method.id, "Bank account awaiting verification");
                self.finish(CustomerSheetResult::Selected(Some(PaymentSelection::saved(
                    payment_method,
                ))));
            }
            FlowMessage::Attached {
                payment_method,
                style,
            } => self.on_payment_method_attached(payment_method, style),
            FlowMessage::AttachFailed { failure, style } => self.on_attach_failed(failure, style),
            FlowMessage::ConfirmationRequired {
                payment_method,
                request,
            } => {
                let Some(launcher) = self.launcher.current() else {
                    let cause = SheetError::ConfirmationUnavailable(
                        "no confirmation launcher is registered".to_string(),
                    );
                    return self.on_attach_failed(BackendFailure::new(cause), AttachStyle::SetupIntent);
                };

                self.unconfirmed_payment_method = Some(payment_method);
                let (reply, outcome) = oneshot::channel();
                launcher.launch(request, reply);
                self.spawn(async move {
                    let outcome = outcome.await.unwrap_or_else(|_| {
                        ConfirmationOutcome::Failed(SheetError::ConfirmationUnavailable(
                            "confirmation UI closed without a result".to_string(),
                        ))
                    });
                    FlowMessage::ConfirmationFinished(outcome)
                });
            }
            FlowMessage::ConfirmationFinished(outcome) => self.on_confirmation_finished(outcome),
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    fn on_back_pressed(&mut self) {
        let hidden = self.stack.current().screen();
        match self.stack.pop() {
            None => self.finish(CustomerSheetResult::Canceled(self.original_selection.clone())),
            Some(popped) => {
                if let Some(screen) = hidden {
                    self.collaborators.event_reporter.on_screen_hidden(screen);
                }
                self.publish(popped);
            }
        }
    }

    fn on_dismissed(&mut self) {
        self.finish(CustomerSheetResult::Canceled(self.original_selection.clone()));
    }

    fn on_dismiss_requested(&mut self) {
        if self.should_dismiss() {
            return self.on_dismissed();
        }
        let next = self.stack.map_add(|s| AddPaymentMethodState {
            display_dismiss_confirmation_modal: true,
            ..s.clone()
        });
        self.publish(next);
    }

    fn transition(&mut self, to: ScreenState, reset: bool) {
        if let Some(screen) = to.screen() {
            self.collaborators.event_reporter.on_screen_presented(screen);
        }
        let next = if reset {
            BackStack::new(to)
        } else {
            self.stack.push(to)
        };
        self.publish(next);
    }

    fn transition_to_add_payment_method(&mut self, is_first_payment_method: bool) {
        let payment_method_code = self
            .previously_selected
            .as_ref()
            .or_else(|| self.supported_payment_methods.first())
            .map(|supported| supported.code.clone())
            .unwrap_or_else(|| CARD.to_string());

        let add = AddPaymentMethodState {
            primary_button_label: add_form_label(&payment_method_code, None),
            payment_method_code,
            supported_payment_methods: self.supported_payment_methods.clone(),
            form_field_values: None,
            enabled: true,
            is_processing: false,
            is_first_payment_method,
            is_live_mode: self.is_live_mode(),
            primary_button_enabled: false,
            error_message: None,
            mandate_text: None,
            show_mandate_above_primary_button: false,
            bank_account_result: None,
            display_dismiss_confirmation_modal: false,
            cbc_eligibility: self.cbc_eligibility(),
        };
        self.transition(ScreenState::AddPaymentMethod(add), is_first_payment_method);
    }

    fn on_modify_item(&mut self, payment_method: PaymentMethod) {
        let Some(select) = self.stack.current().as_select() else {
            return;
        };
        let saved_payment_methods = select.saved_payment_methods.clone();
        let can_remove = select.allows_removal_of_last_saved_payment_method
            || saved_payment_methods.len() > 1;

        let edit = EditPaymentMethodState {
            payment_method,
            can_remove,
            is_processing: false,
            error_message: None,
            is_live_mode: self.is_live_mode(),
            cbc_eligibility: self.cbc_eligibility(),
            saved_payment_methods,
        };
        self.transition(ScreenState::EditPaymentMethod(edit), false);
    }

    // ------------------------------------------------------------------
    // Selection screen
    // ------------------------------------------------------------------

    fn on_edit_pressed(&mut self) {
        let Some(select) = self.stack.current().as_select() else {
            return;
        };
        if select.is_editing {
            self.collaborators.event_reporter.on_edit_completed();
        } else {
            self.collaborators.event_reporter.on_edit_tapped();
        }

        let original = self.original_selection.clone();
        let next = self.stack.map_select(|s| {
            let is_editing = !s.is_editing;
            SelectPaymentMethodState {
                is_editing,
                primary_button_visible: !is_editing && original != s.payment_selection,
                can_remove_payment_methods: if is_editing {
                    s.can_remove_payment_methods
                } else {
                    s.can_edit()
                },
                ..s.clone()
            }
        });
        self.publish(next);
    }

    fn on_item_selected(&mut self, selection: PaymentSelection) -> SheetResult<()> {
        if selection == PaymentSelection::Link {
            return Err(SheetError::UnsupportedSelection(
                "Link cannot be selected when saving payment methods".to_string(),
            ));
        }
        if self.stack.current().is_editing() {
            return Ok(());
        }

        let visible = self.original_selection.as_ref() != Some(&selection);
        let mandate_text = self.mandate_text_for(&selection).filter(|_| visible);
        let next = self.stack.map_select(|s| SelectPaymentMethodState {
            payment_selection: Some(selection.clone()),
            primary_button_visible: visible,
            primary_button_label: PrimaryButtonLabel::Confirm,
            mandate_text: mandate_text.clone(),
            error_message: None,
            ..s.clone()
        });
        self.publish(next);
        Ok(())
    }

    fn on_primary_button_pressed(&mut self) -> SheetResult<()> {
        match self.stack.current() {
            ScreenState::AddPaymentMethod(add) => {
                if add.is_processing {
                    return Ok(());
                }
                let Some(values) = add.form_field_values.as_ref() else {
                    debug!("Primary button pressed with an incomplete form");
                    return Ok(());
                };
                let params = values.to_create_params(&add.payment_method_code);
                self.create_and_attach(params);
                Ok(())
            }
            ScreenState::SelectPaymentMethod(select) => {
                if select.is_processing {
                    return Ok(());
                }
                let selection = select.payment_selection.clone();
                if selection == Some(PaymentSelection::Link) {
                    return Err(SheetError::UnsupportedSelection(
                        "Link cannot be persisted as the customer's selection".to_string(),
                    ));
                }
                self.persist_selection(selection);
                Ok(())
            }
            other => Err(SheetError::InvalidRequest(format!(
                "no primary button on {:?}",
                other.screen()
            ))),
        }
    }

    fn persist_selection(&mut self, selection: Option<PaymentSelection>) {
        let next = self.stack.map_select(|s| SelectPaymentMethodState {
            is_processing: true,
            error_message: None,
            ..s.clone()
        });
        self.publish(next);

        let backend = self.collaborators.backend.clone();
        let timeout = self.configuration.backend_timeout();
        self.spawn(async move {
            let option = selection.as_ref().map(PaymentSelection::to_payment_option);
            let result = match backend.resolve(timeout).await {
                Ok(backend) => backend.set_selected_option(option).await,
                Err(cause) => Err(BackendFailure::new(cause)),
            };
            FlowMessage::SelectionPersisted { selection, result }
        });
    }

    fn on_selection_persisted(
        &mut self,
        selection: Option<PaymentSelection>,
        result: BackendResult<()>,
    ) {
        let type_code = selection
            .as_ref()
            .map(|s| s.type_code().to_string())
            .unwrap_or_else(|| "none".to_string());

        match result {
            Ok(()) => {
                self.collaborators
                    .event_reporter
                    .on_confirm_payment_method(&type_code, true);
                self.finish(CustomerSheetResult::Selected(selection));
            }
            Err(failure) => {
                self.collaborators
                    .event_reporter
                    .on_confirm_payment_method(&type_code, false);
                self.report(ErrorEvent::ConfirmFailure, &failure.cause);
                let message = failure.message_or_fallback();
                let next = self.stack.map_select(|s| SelectPaymentMethodState {
                    is_processing: false,
                    error_message: Some(message.clone()),
                    ..s.clone()
                });
                self.publish(next);
            }
        }
    }

    // ------------------------------------------------------------------
    // Removal and update
    // ------------------------------------------------------------------

    fn detach(&mut self, payment_method: PaymentMethod, source: RemovalSource) {
        let backend = self.collaborators.backend.clone();
        let timeout = self.configuration.backend_timeout();
        self.spawn(async move {
            let result = match backend.resolve(timeout).await {
                Ok(backend) => backend.detach_payment_method(&payment_method.id).await,
                Err(cause) => Err(BackendFailure::new(cause)),
            };
            FlowMessage::Removed {
                payment_method,
                source,
                result,
            }
        });
    }

    fn on_remove_from_edit_screen(&mut self) {
        let Some(edit) = self.stack.current().as_edit() else {
            return;
        };
        if !edit.can_remove || edit.is_processing {
            return;
        }
        let payment_method = edit.payment_method.clone();

        let next = self.stack.map_edit(|s| EditPaymentMethodState {
            is_processing: true,
            error_message: None,
            ..s.clone()
        });
        self.publish(next);
        self.detach(payment_method, RemovalSource::EditScreen);
    }

    fn on_removed(
        &mut self,
        payment_method: PaymentMethod,
        source: RemovalSource,
        result: BackendResult<PaymentMethod>,
    ) {
        match result {
            Ok(_) => {
                info!(id = %payment_method.id, ?source, "Removed payment method");
                self.collaborators.event_reporter.on_remove_payment_method(true);
                match source {
                    RemovalSource::SelectScreen => self.remove_from_state(&payment_method),
                    RemovalSource::EditScreen => {
                        if self.stack.current().as_edit().is_some() {
                            self.on_back_pressed();
                        }
                        self.schedule_removal(payment_method);
                    }
                }
            }
            Err(failure) => {
                self.collaborators.event_reporter.on_remove_payment_method(false);
                self.report(ErrorEvent::DetachFailure, &failure.cause);
                let message = failure.message_or_fallback();
                let next = match source {
                    RemovalSource::SelectScreen => {
                        self.stack.map_select(|s| SelectPaymentMethodState {
                            is_processing: false,
                            error_message: Some(message.clone()),
                            ..s.clone()
                        })
                    }
                    RemovalSource::EditScreen if self.stack.current().as_edit().is_some() => {
                        self.stack.map_edit(|s| EditPaymentMethodState {
                            is_processing: false,
                            error_message: Some(message.clone()),
                            ..s.clone()
                        })
                    }
                    // The edit screen is gone; show the failure where the user is now.
                    RemovalSource::EditScreen => {
                        self.stack.map_select(|s| SelectPaymentMethodState {
                            error_message: Some(message.clone()),
                            ..s.clone()
                        })
                    }
                };
                self.publish(next);
            }
        }
    }

    /// Let the selection screen show before the list changes.
    fn schedule_removal(&mut self, payment_method: PaymentMethod) {
        let delay = self.configuration.removal_delay();
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            FlowMessage::RemovalDelayElapsed(payment_method)
        });
    }

    fn remove_from_state(&mut self, payment_method: &PaymentMethod) {
        let Some(select) = self.stack.screens().find_map(ScreenState::as_select) else {
            return;
        };
        let remaining: Vec<PaymentMethod> = select
            .saved_payment_methods
            .iter()
            .filter(|pm| pm.id != payment_method.id)
            .cloned()
            .collect();

        if is_saved_with_id(&self.original_selection, &payment_method.id) {
            self.original_selection = None;
        }
        let original = self.original_selection.clone();

        let next = self.stack.map_select(|s| {
            let payment_selection = if is_saved_with_id(&s.payment_selection, &payment_method.id) {
                original.clone()
            } else {
                s.payment_selection.clone()
            };
            let mut updated = SelectPaymentMethodState {
                saved_payment_methods: remaining.clone(),
                error_message: None,
                ..s.clone()
            };
            let can_edit = updated.can_edit();
            updated.is_editing = s.is_editing && can_edit;
            updated.can_remove_payment_methods = can_edit;
            updated.primary_button_visible = !updated.is_editing && payment_selection != original;
            updated.payment_selection = payment_selection;
            updated
        });
        self.publish(next);

        if remaining.is_empty() && !self.is_google_pay_ready() {
            self.transition_to_add_payment_method(true);
        }
    }

    fn on_update_card_brand(&mut self, brand: CardBrand) {
        let Some(edit) = self.stack.current().as_edit() else {
            return;
        };
        if edit.is_processing {
            return;
        }
        let payment_method_id = edit.payment_method.id.clone();

        let next = self.stack.map_edit(|s| EditPaymentMethodState {
            is_processing: true,
            error_message: None,
            ..s.clone()
        });
        self.publish(next);

        let backend = self.collaborators.backend.clone();
        let timeout = self.configuration.backend_timeout();
        self.spawn(async move {
            let params = PaymentMethodUpdateParams::preferred_network(brand);
            let result = match backend.resolve(timeout).await {
                Ok(backend) => backend.update_payment_method(&payment_method_id, &params).await,
                Err(cause) => Err(BackendFailure::new(cause)),
            };
            FlowMessage::Updated(result)
        });
    }

    fn on_updated(&mut self, result: BackendResult<PaymentMethod>) {
        match result {
            Ok(updated) => {
                self.collaborators.event_reporter.on_update_payment_method(true);
                if self.stack.current().as_edit().is_some() {
                    self.on_back_pressed();
                }
                self.update_in_state(&updated);
            }
            Err(failure) => {
                self.collaborators.event_reporter.on_update_payment_method(false);
                self.report(ErrorEvent::UpdateFailure, &failure.cause);
                let message = failure.message_or_fallback();
                let next = self.stack.map_edit(|s| EditPaymentMethodState {
                    is_processing: false,
                    error_message: Some(message.clone()),
                    ..s.clone()
                });
                self.publish(next);
            }
        }
    }

    /// Replace the record with the same id wherever it appears.
    fn update_in_state(&mut self, updated: &PaymentMethod) {
        let replace = |selection: &Option<PaymentSelection>| {
            if is_saved_with_id(selection, &updated.id) {
                Some(PaymentSelection::saved(updated.clone()))
            } else {
                selection.clone()
            }
        };

        self.original_selection = replace(&self.original_selection);
        let next = self.stack.map_select(|s| SelectPaymentMethodState {
            saved_payment_methods: s
                .saved_payment_methods
                .iter()
                .map(|pm| if pm.id == updated.id { updated.clone() } else { pm.clone() })
                .collect(),
            payment_selection: replace(&s.payment_selection),
            ..s.clone()
        });
        self.publish(next);
    }

    // ------------------------------------------------------------------
    // Add screen and attach
    // ------------------------------------------------------------------

    fn on_add_payment_method_item_changed(&mut self, supported: SupportedPaymentMethod) {
        let Some(add) = self.stack.current().as_add() else {
            return;
        };
        if add.payment_method_code == supported.code {
            return;
        }

        self.collaborators
            .event_reporter
            .on_payment_method_type_selected(&supported.code);
        let code = supported.code.clone();
        self.previously_selected = Some(supported);

        let next = self.stack.map_add(|s| AddPaymentMethodState {
            payment_method_code: code.clone(),
            primary_button_label: add_form_label(&code, None),
            form_field_values: None,
            primary_button_enabled: false,
            error_message: None,
            mandate_text: None,
            bank_account_result: None,
            ..s.clone()
        });
        self.publish(next);
    }

    fn create_and_attach(&mut self, params: PaymentMethodCreateParams) {
        let next = self.stack.map_add(|s| AddPaymentMethodState {
            is_processing: true,
            primary_button_enabled: false,
            enabled: false,
            error_message: None,
            ..s.clone()
        });
        self.publish(next);

        let ctx = AttachContext {
            backend: self.collaborators.backend.clone(),
            payments: Arc::clone(&self.collaborators.payments),
            interceptor: Arc::clone(&self.collaborators.interceptor),
            backend_timeout: self.configuration.backend_timeout(),
        };
        self.spawn(attach::create_and_attach(ctx, params));
    }

    /// The one path taken whenever a new method becomes usable.
    fn on_payment_method_attached(&mut self, payment_method: PaymentMethod, style: AttachStyle) {
        self.collaborators
            .event_reporter
            .on_attach_payment_method(style, true);

        if !self.stack.contains_select() {
            let next = self
                .stack
                .prepend(ScreenState::SelectPaymentMethod(self.default_select_state()));
            self.publish(next);
        }

        let selection = PaymentSelection::saved(payment_method.clone());
        let mandate_text = self.mandate_text_for(&selection);
        let next = self.stack.map_select(|s| {
            let mut saved_payment_methods = vec![payment_method.clone()];
            saved_payment_methods.extend(
                s.saved_payment_methods
                    .iter()
                    .filter(|pm| pm.id != payment_method.id)
                    .cloned(),
            );
            let mut updated = SelectPaymentMethodState {
                saved_payment_methods,
                payment_selection: Some(selection.clone()),
                primary_button_visible: true,
                primary_button_label: PrimaryButtonLabel::Confirm,
                mandate_text: mandate_text.clone(),
                error_message: None,
                ..s.clone()
            };
            updated.can_remove_payment_methods = updated.can_edit();
            updated
        });
        self.publish(next);

        // Back may have been pressed while the attach was in flight.
        if self.stack.current().as_add().is_some() {
            self.on_back_pressed();
        }
    }

    fn on_attach_failed(&mut self, failure: BackendFailure, style: AttachStyle) {
        self.collaborators
            .event_reporter
            .on_attach_payment_method(style, false);
        self.report(ErrorEvent::AttachFailure, &failure.cause);
        self.on_add_failed(failure.message_or_fallback());
    }

    fn on_confirmation_finished(&mut self, outcome: ConfirmationOutcome) {
        let unconfirmed = self.unconfirmed_payment_method.take();
        match outcome {
            ConfirmationOutcome::Completed => match unconfirmed {
                Some(payment_method) => {
                    self.on_payment_method_attached(payment_method, AttachStyle::SetupIntent)
                }
                None => warn!("Confirmation completed with no payment method awaiting it"),
            },
            ConfirmationOutcome::Canceled => {
                debug!("Confirmation canceled");
                let next = self.stack.map_add(|s| {
                    let mut add = AddPaymentMethodState {
                        enabled: true,
                        is_processing: false,
                        ..s.clone()
                    };
                    add.primary_button_enabled = add.computed_primary_button_enabled();
                    add
                });
                self.publish(next);
            }
            ConfirmationOutcome::Failed(cause) => {
                self.on_attach_failed(BackendFailure::new(cause), AttachStyle::SetupIntent)
            }
        }
    }

    /// Back to an interactive add form showing `message`
    fn on_add_failed(&mut self, message: String) {
        let next = self.stack.map_add(|s| {
            let mut add = AddPaymentMethodState {
                error_message: Some(message.clone()),
                enabled: true,
                is_processing: false,
                ..s.clone()
            };
            add.primary_button_enabled = add.computed_primary_button_enabled();
            add
        });
        self.publish(next);
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn publish(&mut self, stack: BackStack) {
        self.stack = stack.clone();
        self.stack_tx.send_replace(stack);
    }

    fn finish(&mut self, result: CustomerSheetResult) {
        if let Some(existing) = &self.result {
            warn!(?existing, ?result, "Result already emitted; ignoring");
            return;
        }
        info!(?result, "Customer sheet finished");
        self.result = Some(result);
    }

    fn report(&self, event: ErrorEvent, cause: &SheetError) {
        self.collaborators.error_reporter.report(event, cause);
    }

    /// Run `work` on the tracker; its message is dropped if the flow is cancelled first.
    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = FlowMessage> + Send + 'static,
    {
        let messages = self.messages_tx.clone();
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                message = work => {
                    let _ = messages.send(message);
                }
            }
        });
    }

    fn default_select_state(&self) -> SelectPaymentMethodState {
        SelectPaymentMethodState {
            title: self.configuration.header_text_for_selection_screen.clone(),
            saved_payment_methods: Vec::new(),
            payment_selection: None,
            is_live_mode: self.is_live_mode(),
            is_processing: false,
            is_editing: false,
            is_google_pay_enabled: self.is_google_pay_ready(),
            primary_button_visible: false,
            primary_button_label: PrimaryButtonLabel::Confirm,
            error_message: None,
            mandate_text: None,
            cbc_eligibility: self.cbc_eligibility(),
            allows_removal_of_last_saved_payment_method: self
                .configuration
                .allows_removal_of_last_saved_payment_method,
            can_remove_payment_methods: true,
        }
    }

    fn mandate_text_for(&self, selection: &PaymentSelection) -> Option<String> {
        (selection.type_code() == US_BANK_ACCOUNT).then(|| {
            format!(
                "By saving your bank account for {} you agree to authorize payments pursuant to these terms.",
                self.configuration.merchant_display_name
            )
        })
    }

    fn is_live_mode(&self) -> bool {
        self.metadata
            .as_ref()
            .map(|m| m.is_live_mode)
            .unwrap_or_else(|| self.stack.current().is_live_mode())
    }

    fn is_google_pay_ready(&self) -> bool {
        self.metadata
            .as_ref()
            .map(|m| m.is_google_pay_ready)
            .unwrap_or(false)
    }

    fn cbc_eligibility(&self) -> CardBrandChoiceEligibility {
        self.metadata
            .as_ref()
            .map(|m| m.cbc_eligibility.clone())
            .unwrap_or_default()
    }
}

impl Drop for ViewStateMachine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn is_saved_with_id(selection: &Option<PaymentSelection>, id: &str) -> bool {
    selection
        .as_ref()
        .map(|s| s.is_saved_with_id(id))
        .unwrap_or(false)
}

/// Bank accounts continue to collection until an account is linked.
fn add_form_label(code: &str, bank_account_result: Option<&BankAccountResult>) -> PrimaryButtonLabel {
    if code == US_BANK_ACCOUNT
        && !matches!(bank_account_result, Some(BankAccountResult::Completed { .. }))
    {
        PrimaryButtonLabel::Continue
    } else {
        PrimaryButtonLabel::Save
    }
}
