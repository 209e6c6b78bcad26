//! # Selected Option Store
//!
//! Stripe has no notion of a "selected" payment method for the sheet, so
//! the customer backend persists it through this store.

use async_trait::async_trait;
use sheet_core::{BackendResult, PaymentOption};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persists each customer's selected payment option.
#[async_trait]
pub trait SelectedOptionStore: Send + Sync {
    async fn get(&self, customer_id: &str) -> BackendResult<Option<PaymentOption>>;

    /// Store `option`, or clear the selection when `None`
    async fn set(&self, customer_id: &str, option: Option<PaymentOption>) -> BackendResult<()>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemorySelectionStore {
    options: RwLock<HashMap<String, PaymentOption>>,
}

impl InMemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SelectedOptionStore for InMemorySelectionStore {
    async fn get(&self, customer_id: &str) -> BackendResult<Option<PaymentOption>> {
        Ok(self.options.read().await.get(customer_id).cloned())
    }

    async fn set(&self, customer_id: &str, option: Option<PaymentOption>) -> BackendResult<()> {
        let mut options = self.options.write().await;
        match option {
            Some(option) => {
                options.insert(customer_id.to_string(), option);
            }
            None => {
                options.remove(customer_id);
            }
        }
        Ok(())
    }
}
