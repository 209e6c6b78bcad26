//! # Stripe HTTP Transport
//!
//! Shared request plumbing and wire types. Every response is read as text
//! first so failures can be logged and Stripe's error body surfaced as the
//! customer-facing message.

use crate::config::StripeConfig;
use chrono::DateTime;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sheet_core::{
    BackendFailure, BackendResult, Card, CardBrand, CardNetworks, PaymentMethod, SheetError,
    SheetResult, UsBankAccount,
};
use tracing::{debug, error};

/// Which key authenticates a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Auth {
    /// Customer ephemeral key
    Customer,
    Publishable,
}

#[derive(Clone)]
pub(crate) struct StripeHttp {
    config: StripeConfig,
    client: Client,
}

impl StripeHttp {
    pub fn new(config: StripeConfig) -> SheetResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SheetError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        auth: Auth,
        path: &str,
        query: &[(String, String)],
    ) -> BackendResult<T> {
        self.send(Method::GET, auth, path, query, None, None).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        auth: Auth,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> BackendResult<T> {
        self.send(Method::POST, auth, path, &[], Some(form), idempotency_key)
            .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        auth: Auth,
        path: &str,
        query: &[(String, String)],
        form: Option<&[(String, String)]>,
        idempotency_key: Option<&str>,
    ) -> BackendResult<T> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let authorization = match auth {
            Auth::Customer => self.config.customer_auth_header(),
            Auth::Publishable => self.config.publishable_auth_header(),
        };
        debug!(%method, %url, "Stripe request");

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", authorization)
            .header("Stripe-Version", &self.config.api_version);
        if let Some(account_id) = &self.config.account_id {
            request = request.header("Stripe-Account", account_id);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(form) = form {
            request = request.form(form);
        }
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SheetError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SheetError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("Stripe API error: status={}, body={}", status, body);
            return Err(parse_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            BackendFailure::new(SheetError::Serialization(format!(
                "Failed to parse Stripe response: {}",
                e
            )))
        })
    }
}

/// Stripe's error envelope; its message is written for customers
fn parse_error(status: u16, body: &str) -> BackendFailure {
    match serde_json::from_str::<StripeErrorResponse>(body) {
        Ok(response) => {
            let message = response.error.message;
            BackendFailure::new(SheetError::ProviderError {
                provider: "stripe".to_string(),
                message: message.clone(),
            })
            .with_display_message(message)
        }
        Err(_) => BackendFailure::new(SheetError::ProviderError {
            provider: "stripe".to_string(),
            message: format!("HTTP {}: {}", status, body),
        }),
    }
}

// =============================================================================
// Stripe API Types (internal)
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StripeList<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StripePaymentMethod {
    id: String,
    #[serde(rename = "type")]
    type_code: String,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    livemode: bool,
    #[serde(default)]
    card: Option<StripeCard>,
    #[serde(default)]
    us_bank_account: Option<StripeUsBankAccount>,
}

#[derive(Debug, Deserialize)]
struct StripeCard {
    brand: String,
    last4: String,
    #[serde(default)]
    exp_month: Option<u32>,
    #[serde(default)]
    exp_year: Option<u32>,
    #[serde(default)]
    networks: Option<CardNetworks>,
}

#[derive(Debug, Deserialize)]
struct StripeUsBankAccount {
    #[serde(default)]
    bank_name: Option<String>,
    last4: String,
    /// Absent for accounts that still need micro-deposit verification
    #[serde(default)]
    financial_connections_account: Option<String>,
}

impl From<StripePaymentMethod> for PaymentMethod {
    fn from(pm: StripePaymentMethod) -> Self {
        let mut method = PaymentMethod::new(pm.id, pm.type_code);
        method.created = pm.created.and_then(|ts| DateTime::from_timestamp(ts, 0));
        method.live_mode = pm.livemode;
        method.card = pm.card.map(|card| Card {
            brand: CardBrand::from_code(&card.brand),
            last4: card.last4,
            exp_month: card.exp_month,
            exp_year: card.exp_year,
            networks: card.networks,
        });
        method.us_bank_account = pm.us_bank_account.map(|account| UsBankAccount {
            bank_name: account.bank_name,
            last4: account.last4,
            verified: account.financial_connections_account.is_some(),
        });
        method
    }
}
