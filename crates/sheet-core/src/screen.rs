//! # Screen States
//!
//! Typed screen states and the back-stack that owns them.
//!
//! The back-stack is persistent: every operation returns a new stack and
//! shares untouched screens with the old one, so a snapshot taken before a
//! transition never changes underneath its holder.

use crate::metadata::{CardBrandChoiceEligibility, SupportedPaymentMethod};
use crate::payment_method::{PaymentMethod, PaymentMethodCreateParams};
use crate::selection::PaymentSelection;
use crate::telemetry::Screen;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Label on the primary button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryButtonLabel {
    Save,
    Continue,
    Confirm,
}

/// Values of a completed add form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFieldValues {
    /// Field values keyed by API name (e.g. "card[number]")
    pub fields: BTreeMap<String, String>,
}

impl FormFieldValues {
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Creation parameters for the given payment method type
    pub fn to_create_params(&self, type_code: &str) -> PaymentMethodCreateParams {
        PaymentMethodCreateParams {
            type_code: type_code.to_string(),
            fields: self.fields.clone(),
        }
    }
}

/// Outcome of the bank account collection UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BankAccountResult {
    Completed { bank_name: Option<String>, last4: String },
    Canceled,
    Failed { message: String },
}

/// List of saved methods the customer picks from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectPaymentMethodState {
    pub title: Option<String>,
    pub saved_payment_methods: Vec<PaymentMethod>,
    pub payment_selection: Option<PaymentSelection>,
    pub is_live_mode: bool,
    pub is_processing: bool,
    pub is_editing: bool,
    pub is_google_pay_enabled: bool,
    pub primary_button_visible: bool,
    pub primary_button_label: PrimaryButtonLabel,
    pub error_message: Option<String>,
    pub mandate_text: Option<String>,
    pub cbc_eligibility: CardBrandChoiceEligibility,
    pub allows_removal_of_last_saved_payment_method: bool,
    /// Last value of [`Self::can_edit`], refreshed when the list changes or edit mode ends
    pub can_remove_payment_methods: bool,
}

impl SelectPaymentMethodState {
    /// Whether edit mode has anything to offer for the current list
    pub fn can_edit(&self) -> bool {
        can_edit(
            self.allows_removal_of_last_saved_payment_method,
            &self.saved_payment_methods,
            &self.cbc_eligibility,
        )
    }
}

/// Edit mode is useful if something can be removed or a card's network changed.
pub fn can_edit(
    allows_removal_of_last_saved_payment_method: bool,
    saved_payment_methods: &[PaymentMethod],
    cbc_eligibility: &CardBrandChoiceEligibility,
) -> bool {
    let can_remove = if allows_removal_of_last_saved_payment_method {
        !saved_payment_methods.is_empty()
    } else {
        saved_payment_methods.len() > 1
    };
    let can_modify =
        cbc_eligibility.is_eligible() && saved_payment_methods.iter().any(PaymentMethod::is_modifiable);

    can_remove || can_modify
}

/// Form for a new payment method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPaymentMethodState {
    pub payment_method_code: String,
    pub supported_payment_methods: Vec<SupportedPaymentMethod>,
    /// `Some` once the form is complete
    pub form_field_values: Option<FormFieldValues>,
    pub enabled: bool,
    pub is_processing: bool,
    pub is_first_payment_method: bool,
    pub is_live_mode: bool,
    pub primary_button_label: PrimaryButtonLabel,
    pub primary_button_enabled: bool,
    pub error_message: Option<String>,
    pub mandate_text: Option<String>,
    pub show_mandate_above_primary_button: bool,
    pub bank_account_result: Option<BankAccountResult>,
    pub display_dismiss_confirmation_modal: bool,
    pub cbc_eligibility: CardBrandChoiceEligibility,
}

impl AddPaymentMethodState {
    /// Enabled iff the form is complete and nothing is in flight
    pub fn computed_primary_button_enabled(&self) -> bool {
        self.form_field_values.is_some() && !self.is_processing
    }
}

/// Details of one saved method, with remove and brand update actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPaymentMethodState {
    pub payment_method: PaymentMethod,
    pub can_remove: bool,
    pub is_processing: bool,
    pub error_message: Option<String>,
    pub is_live_mode: bool,
    pub cbc_eligibility: CardBrandChoiceEligibility,
    pub saved_payment_methods: Vec<PaymentMethod>,
}

/// A screen of the flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum ScreenState {
    Loading { is_live_mode: bool },
    SelectPaymentMethod(SelectPaymentMethodState),
    AddPaymentMethod(AddPaymentMethodState),
    EditPaymentMethod(EditPaymentMethodState),
}

impl ScreenState {
    pub fn as_select(&self) -> Option<&SelectPaymentMethodState> {
        match self {
            ScreenState::SelectPaymentMethod(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_add(&self) -> Option<&AddPaymentMethodState> {
        match self {
            ScreenState::AddPaymentMethod(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_edit(&self) -> Option<&EditPaymentMethodState> {
        match self {
            ScreenState::EditPaymentMethod(state) => Some(state),
            _ => None,
        }
    }

    /// Only the selection screen has an edit mode
    pub fn is_editing(&self) -> bool {
        self.as_select().map(|s| s.is_editing).unwrap_or(false)
    }

    pub fn is_live_mode(&self) -> bool {
        match self {
            ScreenState::Loading { is_live_mode } => *is_live_mode,
            ScreenState::SelectPaymentMethod(state) => state.is_live_mode,
            ScreenState::AddPaymentMethod(state) => state.is_live_mode,
            ScreenState::EditPaymentMethod(state) => state.is_live_mode,
        }
    }

    pub fn cbc_eligibility(&self) -> CardBrandChoiceEligibility {
        match self {
            ScreenState::Loading { .. } => CardBrandChoiceEligibility::Ineligible,
            ScreenState::SelectPaymentMethod(state) => state.cbc_eligibility.clone(),
            ScreenState::AddPaymentMethod(state) => state.cbc_eligibility.clone(),
            ScreenState::EditPaymentMethod(state) => state.cbc_eligibility.clone(),
        }
    }

    /// Analytics name of the screen
    pub fn screen(&self) -> Option<Screen> {
        match self {
            ScreenState::Loading { .. } => None,
            ScreenState::SelectPaymentMethod(_) => Some(Screen::SelectPaymentMethod),
            ScreenState::AddPaymentMethod(_) => Some(Screen::AddPaymentMethod),
            ScreenState::EditPaymentMethod(_) => Some(Screen::EditPaymentMethod),
        }
    }
}

/// Ordered history of screens; the last one is visible.
///
/// Never empty. Operations return a new stack and leave `self` untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackStack {
    screens: Vec<Arc<ScreenState>>,
}

impl BackStack {
    /// A stack holding only `root`
    pub fn new(root: ScreenState) -> Self {
        Self {
            screens: vec![Arc::new(root)],
        }
    }

    /// The visible screen
    pub fn current(&self) -> &ScreenState {
        // Invariant: the stack always holds at least its root.
        &self.screens[self.screens.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    pub fn screens(&self) -> impl Iterator<Item = &ScreenState> {
        self.screens.iter().map(|s| s.as_ref())
    }

    /// Shared handle to the screen at `index`
    pub fn screen_arc(&self, index: usize) -> Option<&Arc<ScreenState>> {
        self.screens.get(index)
    }

    /// Append `screen` on top
    pub fn push(&self, screen: ScreenState) -> Self {
        let mut screens = self.screens.clone();
        screens.push(Arc::new(screen));
        Self { screens }
    }

    /// Drop the top screen, or `None` if it is the only one
    pub fn pop(&self) -> Option<Self> {
        if self.screens.len() <= 1 {
            return None;
        }
        let mut screens = self.screens.clone();
        screens.pop();
        Some(Self { screens })
    }

    /// Insert `screen` beneath everything else
    pub fn prepend(&self, screen: ScreenState) -> Self {
        let mut screens = Vec::with_capacity(self.screens.len() + 1);
        screens.push(Arc::new(screen));
        screens.extend(self.screens.iter().cloned());
        Self { screens }
    }

    pub fn contains_select(&self) -> bool {
        self.screens().any(|s| s.as_select().is_some())
    }

    /// Replace every screen for which `f` returns `Some`
    pub fn map_where(&self, mut f: impl FnMut(&ScreenState) -> Option<ScreenState>) -> Self {
        let screens = self
            .screens
            .iter()
            .map(|screen| match f(screen) {
                Some(replacement) => Arc::new(replacement),
                None => Arc::clone(screen),
            })
            .collect();
        Self { screens }
    }

    /// Update every selection screen in the stack
    pub fn map_select(
        &self,
        mut f: impl FnMut(&SelectPaymentMethodState) -> SelectPaymentMethodState,
    ) -> Self {
        self.map_where(|screen| match screen {
            ScreenState::SelectPaymentMethod(state) => {
                Some(ScreenState::SelectPaymentMethod(f(state)))
            }
            _ => None,
        })
    }

    /// Update every add screen in the stack
    pub fn map_add(
        &self,
        mut f: impl FnMut(&AddPaymentMethodState) -> AddPaymentMethodState,
    ) -> Self {
        self.map_where(|screen| match screen {
            ScreenState::AddPaymentMethod(state) => Some(ScreenState::AddPaymentMethod(f(state))),
            _ => None,
        })
    }

    /// Update every edit screen in the stack
    pub fn map_edit(
        &self,
        mut f: impl FnMut(&EditPaymentMethodState) -> EditPaymentMethodState,
    ) -> Self {
        self.map_where(|screen| match screen {
            ScreenState::EditPaymentMethod(state) => {
                Some(ScreenState::EditPaymentMethod(f(state)))
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment_method::CardBrand;

    fn select(methods: Vec<PaymentMethod>) -> SelectPaymentMethodState {
        SelectPaymentMethodState {
            title: None,
            saved_payment_methods: methods,
            payment_selection: None,
            is_live_mode: false,
            is_processing: false,
            is_editing: false,
            is_google_pay_enabled: false,
            primary_button_visible: false,
            primary_button_label: PrimaryButtonLabel::Confirm,
            error_message: None,
            mandate_text: None,
            cbc_eligibility: CardBrandChoiceEligibility::Ineligible,
            allows_removal_of_last_saved_payment_method: true,
            can_remove_payment_methods: true,
        }
    }

    #[test]
    fn test_pop_on_root_is_none() {
        let stack = BackStack::new(ScreenState::Loading { is_live_mode: false });
        assert!(stack.pop().is_none());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_push_leaves_snapshot_untouched() {
        let root = BackStack::new(ScreenState::SelectPaymentMethod(select(vec![])));
        let pushed = root.push(ScreenState::Loading { is_live_mode: true });

        assert_eq!(root.len(), 1);
        assert_eq!(pushed.len(), 2);
        assert!(Arc::ptr_eq(
            root.screen_arc(0).unwrap(),
            pushed.screen_arc(0).unwrap()
        ));
        assert!(matches!(pushed.current(), ScreenState::Loading { .. }));
        assert_eq!(&pushed.pop().unwrap(), &root);
    }

    #[test]
    fn test_map_select_shares_other_screens() {
        let stack = BackStack::new(ScreenState::SelectPaymentMethod(select(vec![])))
            .push(ScreenState::Loading { is_live_mode: false });

        let updated = stack.map_select(|s| SelectPaymentMethodState {
            error_message: Some("X".into()),
            ..s.clone()
        });

        assert_eq!(
            updated.screens().next().and_then(|s| s.as_select()).and_then(|s| s.error_message.clone()),
            Some("X".to_string())
        );
        assert!(Arc::ptr_eq(
            stack.screen_arc(1).unwrap(),
            updated.screen_arc(1).unwrap()
        ));
        assert!(stack.current().as_select().is_none());
    }

    #[test]
    fn test_prepend() {
        let stack = BackStack::new(ScreenState::Loading { is_live_mode: false })
            .prepend(ScreenState::SelectPaymentMethod(select(vec![])));
        assert!(stack.contains_select());
        assert!(matches!(stack.current(), ScreenState::Loading { .. }));
    }

    #[test]
    fn test_can_edit() {
        let visa = PaymentMethod::card("pm_1", CardBrand::Visa, "4242");
        let cobrand = PaymentMethod::card("pm_2", CardBrand::CartesBancaires, "1001")
            .with_networks(&["cartes_bancaires", "visa"], None);
        let eligible = CardBrandChoiceEligibility::Eligible {
            preferred_networks: vec![],
        };

        assert!(can_edit(true, &[visa.clone()], &CardBrandChoiceEligibility::Ineligible));
        assert!(!can_edit(false, &[visa.clone()], &CardBrandChoiceEligibility::Ineligible));
        assert!(can_edit(false, &[visa.clone(), cobrand.clone()], &eligible));
        assert!(can_edit(false, &[cobrand], &eligible));
        assert!(!can_edit(true, &[], &eligible));
    }
}
