//! # Customer Sheet
//!
//! Entry point for hosts: load, then run the state machine on its own task
//! and hand back a [`SheetHandle`] to drive it.

use crate::actions::ViewAction;
use crate::loader::SheetLoader;
use crate::machine::{FlowCollaborators, LauncherRegistration, ViewStateMachine};
use sheet_core::{
    BackStack, BoxedConfirmationLauncher, CustomerSheetResult, ScreenState, SheetConfiguration,
    SheetError, SheetResult,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info, warn};

/// A configured sheet, ready to launch
pub struct CustomerSheet {
    configuration: SheetConfiguration,
    loader: Arc<dyn SheetLoader>,
    collaborators: FlowCollaborators,
    launcher: LauncherRegistration,
    is_live_mode: bool,
}

impl CustomerSheet {
    pub fn new(
        configuration: SheetConfiguration,
        loader: Arc<dyn SheetLoader>,
        collaborators: FlowCollaborators,
    ) -> Self {
        Self {
            configuration,
            loader,
            collaborators,
            launcher: LauncherRegistration::new(),
            is_live_mode: false,
        }
    }

    /// Builder: live mode for the loading screen
    pub fn with_live_mode(mut self, is_live_mode: bool) -> Self {
        self.is_live_mode = is_live_mode;
        self
    }

    /// Builder: register the confirmation UI up front
    pub fn with_confirmation_launcher(self, launcher: BoxedConfirmationLauncher) -> Self {
        self.launcher.register(launcher);
        self
    }

    /// Spawn the flow on the current runtime.
    ///
    /// While loading, only dismiss and back are honoured.
    pub fn launch(self) -> SheetHandle {
        let mut machine = ViewStateMachine::new(
            self.configuration.clone(),
            self.collaborators,
            self.is_live_mode,
        )
        .with_launcher_registration(self.launcher.clone());

        let back_stack = machine.subscribe();
        let cancel = machine.cancellation_token();
        let (actions, mut receiver) = mpsc::unbounded_channel();
        let loader = self.loader;
        let configuration = self.configuration;
        let load_cancel = cancel.clone();

        info!(merchant = %configuration.merchant_display_name, "Launching customer sheet");
        let task = tokio::spawn(async move {
            let load = loader.load(&configuration);
            tokio::pin!(load);

            let loaded = loop {
                tokio::select! {
                    biased;
                    _ = load_cancel.cancelled() => return machine.close(),
                    loaded = &mut load => break loaded,
                    action = receiver.recv() => match action {
                        Some(action) => {
                            if let Err(err) = machine.handle_action(action) {
                                warn!(error = %err, "Rejected view action while loading");
                            }
                            if machine.result().is_some() {
                                return machine.close();
                            }
                        }
                        None => return machine.close(),
                    },
                }
            };

            machine.apply_loaded(loaded);
            machine.run(receiver).await
        });

        SheetHandle {
            actions,
            back_stack,
            launcher: self.launcher,
            cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }
}

/// Host-side handle to a running sheet.
///
/// Dropping the handle tears the flow down.
pub struct SheetHandle {
    actions: mpsc::UnboundedSender<ViewAction>,
    back_stack: watch::Receiver<BackStack>,
    launcher: LauncherRegistration,
    cancel: CancellationToken,
    cancel_on_drop: DropGuard,
    task: JoinHandle<CustomerSheetResult>,
}

impl SheetHandle {
    pub fn dispatch(&self, action: ViewAction) -> SheetResult<()> {
        self.actions
            .send(action)
            .map_err(|_| SheetError::Canceled("the sheet has already closed".to_string()))
    }

    /// A sender for hosts that dispatch from elsewhere
    pub fn actions(&self) -> mpsc::UnboundedSender<ViewAction> {
        self.actions.clone()
    }

    pub fn current_screen(&self) -> ScreenState {
        self.back_stack.borrow().current().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BackStack> {
        self.back_stack.clone()
    }

    pub fn register_launcher(&self, launcher: BoxedConfirmationLauncher) {
        self.launcher.register(launcher);
    }

    pub fn unregister_launcher(&self) {
        self.launcher.unregister();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Close the sheet; outstanding work is cancelled.
    pub fn close(&self) {
        self.cancel.cancel();
        self.launcher.unregister();
    }

    /// Wait for the flow's single result.
    pub async fn result(self) -> CustomerSheetResult {
        let SheetHandle {
            actions,
            cancel_on_drop,
            task,
            ..
        } = self;

        let result = match task.await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "Customer sheet task failed");
                CustomerSheetResult::Error(SheetError::Internal(err.to_string()))
            }
        };
        drop(actions);
        drop(cancel_on_drop);
        result
    }
}
