//! # Stripe API Client
//!
//! Publishable-key operations used while the sheet is open: creating
//! payment methods, retrieving setup intents and loading the elements
//! session that describes what can be saved.

use crate::config::StripeConfig;
use crate::http::{Auth, StripeHttp, StripePaymentMethod};
use async_trait::async_trait;
use serde::Deserialize;
use sheet_core::{
    intent_id_from_client_secret, BackendFailure, BackendResult, InitializationMode,
    IntentSession, IntentSessionRepository, PaymentMethod, PaymentMethodCreateParams,
    PaymentMethodSpec, PaymentsRepository, SheetError, SheetResult, StripeIntent,
};
use tracing::{debug, info, instrument};

pub struct StripeApiClient {
    http: StripeHttp,
}

impl StripeApiClient {
    pub fn new(config: StripeConfig) -> SheetResult<Self> {
        Ok(Self {
            http: StripeHttp::new(config)?,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> SheetResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    /// Query parameters for `GET /v1/elements/sessions`
    fn session_query(
        mode: &InitializationMode,
        customer_id: Option<&str>,
        external_payment_methods: &[String],
        default_payment_method_id: Option<&str>,
    ) -> Vec<(String, String)> {
        let mut query = Vec::new();
        match mode {
            InitializationMode::DeferredSetup {
                payment_method_types,
            } => {
                query.push(("type".to_string(), "deferred_intent".to_string()));
                query.push(("deferred_intent[mode]".to_string(), "setup".to_string()));
                for (i, type_code) in payment_method_types.iter().enumerate() {
                    query.push((
                        format!("deferred_intent[payment_method_types][{}]", i),
                        type_code.clone(),
                    ));
                }
            }
            InitializationMode::SetupIntent { client_secret } => {
                query.push(("type".to_string(), "setup_intent".to_string()));
                query.push(("client_secret".to_string(), client_secret.clone()));
            }
        }
        if let Some(customer_id) = customer_id {
            query.push(("customer_id".to_string(), customer_id.to_string()));
        }
        for (i, external) in external_payment_methods.iter().enumerate() {
            query.push((format!("external_payment_methods[{}]", i), external.clone()));
        }
        if let Some(id) = default_payment_method_id {
            query.push(("default_payment_method".to_string(), id.to_string()));
        }
        query
    }
}

#[async_trait]
impl PaymentsRepository for StripeApiClient {
    #[instrument(skip(self, params), fields(type_code = %params.type_code))]
    async fn create_payment_method(
        &self,
        params: &PaymentMethodCreateParams,
    ) -> BackendResult<PaymentMethod> {
        let mut form = vec![("type".to_string(), params.type_code.clone())];
        form.extend(params.fields.iter().map(|(k, v)| (k.clone(), v.clone())));

        let created: StripePaymentMethod = self
            .http
            .post(Auth::Publishable, "/v1/payment_methods", &form, None)
            .await?;
        let created = PaymentMethod::from(created);

        info!("Created payment method {}", created.id);
        Ok(created)
    }

    #[instrument(skip_all)]
    async fn retrieve_setup_intent(&self, client_secret: &str) -> BackendResult<StripeIntent> {
        let id = intent_id_from_client_secret(client_secret).ok_or_else(|| {
            BackendFailure::new(SheetError::InvalidRequest(
                "malformed setup intent client secret".to_string(),
            ))
        })?;

        let query = vec![("client_secret".to_string(), client_secret.to_string())];
        let intent: StripeIntent = self
            .http
            .get(Auth::Publishable, &format!("/v1/setup_intents/{}", id), &query)
            .await?;

        debug!(id, status = ?intent.status, "Retrieved setup intent");
        Ok(intent)
    }
}

#[async_trait]
impl IntentSessionRepository for StripeApiClient {
    #[instrument(skip_all)]
    async fn get(
        &self,
        mode: &InitializationMode,
        customer_id: Option<&str>,
        external_payment_methods: &[String],
        default_payment_method_id: Option<&str>,
    ) -> BackendResult<IntentSession> {
        let query = Self::session_query(
            mode,
            customer_id,
            external_payment_methods,
            default_payment_method_id,
        );
        let response: ElementsSessionResponse = self
            .http
            .get(Auth::Publishable, "/v1/elements/sessions", &query)
            .await?;

        let session = response.into_session();
        info!(
            "Loaded elements session: {} payment method types",
            session.payment_method_specs.len()
        );
        Ok(session)
    }
}

// =============================================================================
// Stripe API Types (internal)
// =============================================================================

#[derive(Debug, Deserialize)]
struct ElementsSessionResponse {
    payment_method_preference: PaymentMethodPreference,
    #[serde(default)]
    card_brand_choice: Option<CardBrandChoice>,
    #[serde(default)]
    livemode: bool,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodPreference {
    #[serde(default)]
    ordered_payment_method_types: Vec<String>,
    /// Present when the session was created for a real setup intent
    #[serde(default)]
    setup_intent: Option<StripeIntent>,
}

#[derive(Debug, Deserialize)]
struct CardBrandChoice {
    #[serde(default)]
    eligible: bool,
}

impl ElementsSessionResponse {
    fn into_session(self) -> IntentSession {
        let preference = self.payment_method_preference;
        let payment_method_specs = preference
            .ordered_payment_method_types
            .iter()
            .map(|type_code| PaymentMethodSpec {
                type_code: type_code.clone(),
                display_name: None,
            })
            .collect();
        let stripe_intent = preference.setup_intent.unwrap_or_else(|| {
            StripeIntent::deferred(preference.ordered_payment_method_types, self.livemode)
        });

        IntentSession {
            stripe_intent,
            payment_method_specs,
            card_brand_choice_eligible: self.card_brand_choice.map(|c| c.eligible).unwrap_or(false),
            is_live_mode: self.livemode,
        }
    }
}
