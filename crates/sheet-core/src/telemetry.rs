//! # Telemetry
//!
//! Error reporting and analytics hooks invoked by the loader and the
//! state machine. Both traits default to logging through `tracing`, so a
//! host only overrides what it forwards elsewhere.

use crate::error::SheetError;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Distinct failure points reported before an error surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorEvent {
    /// The customer backend was never provided
    DependencyUnavailable,
    SessionLoadFailure,
    PaymentMethodsLoadFailure,
    /// The intent cannot be used for this flow
    ValidationFailure,
    DetachFailure,
    UpdateFailure,
    CreateFailure,
    AttachFailure,
    /// Persisting the chosen selection failed
    ConfirmFailure,
}

impl ErrorEvent {
    /// Stable tag for dashboards
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorEvent::DependencyUnavailable => "customer_sheet.adapter_not_found",
            ErrorEvent::SessionLoadFailure => "customer_sheet.elements_session_load_failure",
            ErrorEvent::PaymentMethodsLoadFailure => "customer_sheet.payment_methods_load_failure",
            ErrorEvent::ValidationFailure => "customer_sheet.intent_validation_failure",
            ErrorEvent::DetachFailure => "customer_sheet.detach_failure",
            ErrorEvent::UpdateFailure => "customer_sheet.update_failure",
            ErrorEvent::CreateFailure => "customer_sheet.create_failure",
            ErrorEvent::AttachFailure => "customer_sheet.attach_failure",
            ErrorEvent::ConfirmFailure => "customer_sheet.confirm_failure",
        }
    }
}

/// Receives every failure before it is surfaced.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, event: ErrorEvent, cause: &SheetError) {
        error!(event = event.tag(), %cause, "customer sheet error");
    }
}

/// Default error reporter (just logs)
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {}

/// Screens reported to analytics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    SelectPaymentMethod,
    AddPaymentMethod,
    EditPaymentMethod,
}

/// How a new payment method was attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachStyle {
    CreateAttach,
    SetupIntent,
}

/// Analytics hooks the state machine invokes.
#[allow(unused_variables)]
pub trait EventReporter: Send + Sync {
    fn on_screen_presented(&self, screen: Screen) {
        debug!(?screen, "screen presented");
    }

    fn on_screen_hidden(&self, screen: Screen) {
        debug!(?screen, "screen hidden");
    }

    fn on_edit_tapped(&self) {
        debug!("edit tapped");
    }

    fn on_edit_completed(&self) {
        debug!("edit completed");
    }

    fn on_payment_method_type_selected(&self, code: &str) {
        debug!(code, "payment method type selected");
    }

    fn on_remove_payment_method(&self, succeeded: bool) {
        if succeeded {
            info!("payment method removed");
        } else {
            warn!("payment method removal failed");
        }
    }

    fn on_update_payment_method(&self, succeeded: bool) {
        if succeeded {
            info!("payment method updated");
        } else {
            warn!("payment method update failed");
        }
    }

    fn on_attach_payment_method(&self, style: AttachStyle, succeeded: bool) {
        if succeeded {
            info!(?style, "payment method attached");
        } else {
            warn!(?style, "payment method attach failed");
        }
    }

    fn on_confirm_payment_method(&self, type_code: &str, succeeded: bool) {
        if succeeded {
            info!(type_code, "payment selection confirmed");
        } else {
            warn!(type_code, "payment selection confirm failed");
        }
    }
}

/// Default event reporter (just logs)
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventReporter;

impl EventReporter for TracingEventReporter {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_tags_are_unique() {
        let events = [
            ErrorEvent::DependencyUnavailable,
            ErrorEvent::SessionLoadFailure,
            ErrorEvent::PaymentMethodsLoadFailure,
            ErrorEvent::ValidationFailure,
            ErrorEvent::DetachFailure,
            ErrorEvent::UpdateFailure,
            ErrorEvent::CreateFailure,
            ErrorEvent::AttachFailure,
            ErrorEvent::ConfirmFailure,
        ];
        let tags: std::collections::HashSet<_> = events.iter().map(ErrorEvent::tag).collect();
        assert_eq!(tags.len(), events.len());
    }

    #[test]
    fn test_custom_reporter_overrides_default() {
        struct Recording {
            seen: Mutex<Vec<ErrorEvent>>,
        }

        impl ErrorReporter for Recording {
            fn report(&self, event: ErrorEvent, _cause: &SheetError) {
                self.seen.lock().unwrap().push(event);
            }
        }

        let reporter = Recording {
            seen: Mutex::new(Vec::new()),
        };
        reporter.report(
            ErrorEvent::DetachFailure,
            &SheetError::NetworkError("reset".into()),
        );
        TracingErrorReporter.report(
            ErrorEvent::AttachFailure,
            &SheetError::NetworkError("reset".into()),
        );

        assert_eq!(*reporter.seen.lock().unwrap(), vec![ErrorEvent::DetachFailure]);
    }
}
