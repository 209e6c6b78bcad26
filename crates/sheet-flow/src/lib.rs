//! # sheet-flow
//!
//! Loading pipeline and view-state machine for the customer payment-method
//! sheet.
//!
//! - `SheetLoader` / `DefaultSheetLoader` build the initial `CustomerSheetState`
//! - `ViewStateMachine` owns the back-stack and applies `ViewAction`s
//! - `CustomerSheet` runs both on a task and returns a `SheetHandle`
//!
//! ## Example
//!
//! ```rust,ignore
//! use sheet_flow::{CustomerSheet, DefaultSheetLoader, FlowCollaborators, ViewAction};
//!
//! let loader = DefaultSheetLoader::new(slot.clone(), sessions, wallet);
//! let collaborators = FlowCollaborators::new(slot, payments, interceptor);
//!
//! let handle = CustomerSheet::new(config, Arc::new(loader), collaborators)
//!     .with_confirmation_launcher(launcher)
//!     .launch();
//!
//! handle.dispatch(ViewAction::AddPaymentMethodPressed)?;
//! let result = handle.result().await;
//! ```

pub mod actions;
mod attach;
pub mod loader;
pub mod machine;
pub mod sheet;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use actions::ViewAction;
pub use loader::{move_selected_first, DefaultSheetLoader, SheetLoader, SAVEABLE_PAYMENT_METHOD_TYPES};
pub use machine::{FlowCollaborators, LauncherRegistration, ViewStateMachine};
pub use sheet::{CustomerSheet, SheetHandle};
