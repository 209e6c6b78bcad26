//! # Stripe Customer Backend
//!
//! `CustomerBackendClient` over Stripe's customer-scoped payment method
//! endpoints, authenticated with the customer's ephemeral key.
//!
//! Attaching through a setup intent needs a merchant endpoint that creates
//! the intent; supply it as a [`SetupIntentClientSecretProvider`]. Without
//! one, new methods are attached directly.

use crate::config::StripeConfig;
use crate::http::{Auth, StripeHttp, StripeList, StripePaymentMethod};
use crate::selection_store::{InMemorySelectionStore, SelectedOptionStore};
use async_trait::async_trait;
use sheet_core::{
    BackendFailure, BackendResult, CustomerBackendClient, PaymentMethod,
    PaymentMethodUpdateParams, PaymentOption, SheetError, SheetResult, CARD, US_BANK_ACCOUNT,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Merchant hook that creates a setup intent for the customer.
#[async_trait]
pub trait SetupIntentClientSecretProvider: Send + Sync {
    async fn provide_setup_intent_client_secret(&self, customer_id: &str) -> BackendResult<String>;
}

pub struct StripeCustomerBackend {
    http: StripeHttp,
    selection_store: Arc<dyn SelectedOptionStore>,
    setup_intents: Option<Arc<dyn SetupIntentClientSecretProvider>>,
    payment_method_types: Option<Vec<String>>,
}

impl StripeCustomerBackend {
    /// Create a backend that keeps selections in memory
    pub fn new(config: StripeConfig) -> SheetResult<Self> {
        Ok(Self {
            http: StripeHttp::new(config)?,
            selection_store: Arc::new(InMemorySelectionStore::new()),
            setup_intents: None,
            payment_method_types: None,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> SheetResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    pub fn with_selection_store(mut self, store: Arc<dyn SelectedOptionStore>) -> Self {
        self.selection_store = store;
        self
    }

    /// Builder: attach new methods through setup intents
    pub fn with_setup_intents(mut self, provider: Arc<dyn SetupIntentClientSecretProvider>) -> Self {
        self.setup_intents = Some(provider);
        self
    }

    /// Builder: restrict the types the sheet may save
    pub fn with_payment_method_types(mut self, types: &[&str]) -> Self {
        self.payment_method_types = Some(types.iter().map(|t| t.to_string()).collect());
        self
    }

    fn customer_id(&self) -> &str {
        &self.http.config().customer_id
    }

    /// Types listed when retrieving saved methods
    fn listed_types(&self) -> Vec<String> {
        self.payment_method_types
            .clone()
            .unwrap_or_else(|| vec![CARD.to_string(), US_BANK_ACCOUNT.to_string()])
    }
}

#[async_trait]
impl CustomerBackendClient for StripeCustomerBackend {
    #[instrument(skip(self), fields(customer_id = %self.customer_id()))]
    async fn retrieve_payment_methods(&self) -> BackendResult<Vec<PaymentMethod>> {
        let mut methods = Vec::new();
        for type_code in self.listed_types() {
            let query = vec![
                ("customer".to_string(), self.customer_id().to_string()),
                ("type".to_string(), type_code),
            ];
            let list: StripeList<StripePaymentMethod> = self
                .http
                .get(Auth::Customer, "/v1/payment_methods", &query)
                .await?;
            methods.extend(list.data.into_iter().map(PaymentMethod::from));
        }

        info!("Retrieved {} saved payment methods", methods.len());
        Ok(methods)
    }

    async fn retrieve_selected_option(&self) -> BackendResult<Option<PaymentOption>> {
        self.selection_store.get(self.customer_id()).await
    }

    async fn set_selected_option(&self, option: Option<PaymentOption>) -> BackendResult<()> {
        self.selection_store.set(self.customer_id(), option).await
    }

    #[instrument(skip(self), fields(customer_id = %self.customer_id()))]
    async fn attach_payment_method(&self, payment_method_id: &str) -> BackendResult<PaymentMethod> {
        let form = vec![("customer".to_string(), self.customer_id().to_string())];
        let idempotency_key = Uuid::new_v4().to_string();

        let attached: StripePaymentMethod = self
            .http
            .post(
                Auth::Customer,
                &format!("/v1/payment_methods/{}/attach", payment_method_id),
                &form,
                Some(&idempotency_key),
            )
            .await?;

        info!("Attached payment method {}", payment_method_id);
        Ok(attached.into())
    }

    #[instrument(skip(self))]
    async fn detach_payment_method(&self, payment_method_id: &str) -> BackendResult<PaymentMethod> {
        let detached: StripePaymentMethod = self
            .http
            .post(
                Auth::Customer,
                &format!("/v1/payment_methods/{}/detach", payment_method_id),
                &[],
                None,
            )
            .await?;

        info!("Detached payment method {}", payment_method_id);
        Ok(detached.into())
    }

    #[instrument(skip(self, params))]
    async fn update_payment_method(
        &self,
        payment_method_id: &str,
        params: &PaymentMethodUpdateParams,
    ) -> BackendResult<PaymentMethod> {
        let mut form = Vec::new();
        if let Some(brand) = params.preferred_network {
            form.push((
                "card[networks][preferred]".to_string(),
                brand.code().to_string(),
            ));
        }
        for (i, usage) in params.product_usage.iter().enumerate() {
            form.push((format!("metadata[product_usage_{}]", i), usage.clone()));
        }

        let updated: StripePaymentMethod = self
            .http
            .post(
                Auth::Customer,
                &format!("/v1/payment_methods/{}", payment_method_id),
                &form,
                None,
            )
            .await?;
        Ok(updated.into())
    }

    async fn setup_intent_client_secret_for_attach(&self) -> BackendResult<String> {
        match &self.setup_intents {
            Some(provider) => {
                provider
                    .provide_setup_intent_client_secret(self.customer_id())
                    .await
            }
            None => Err(BackendFailure::new(SheetError::InvalidRequest(
                "no setup intent provider is configured".to_string(),
            ))),
        }
    }

    fn can_create_setup_intents(&self) -> bool {
        self.setup_intents.is_some()
    }

    fn payment_method_types(&self) -> Option<Vec<String>> {
        self.payment_method_types.clone()
    }
}
