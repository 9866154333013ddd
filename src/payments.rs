//! Payment processor lookups for orders the ERP has not marked paid.

use crate::errors::AppError;
use async_trait::async_trait;
use failsafe::{backoff, failure_policy, Config, StateMachine};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Answers whether the processor holds a successful payment for an order.
#[async_trait]
pub trait PaymentStatusLookup: Send + Sync {
    async fn find_payment_by_sale_reference(&self, reference: &str) -> Result<bool, AppError>;

    /// The processor's raw record for one payment intent, `None` when unknown.
    async fn get_payment_intent(&self, _intent_id: &str) -> Result<Option<serde_json::Value>, AppError> {
        Ok(None)
    }
}

/// Intent ids are opaque tokens like `pi_3Mtw...`; anything else never
/// reaches the processor.
pub fn validate_intent_id(intent_id: &str) -> Result<&str, AppError> {
    let id = intent_id.trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::BadRequest("Invalid payment intent id".to_string()));
    }
    Ok(id)
}

/// Used when no processor key is configured. Nothing is ever paid.
pub struct DisabledPaymentLookup;

#[async_trait]
impl PaymentStatusLookup for DisabledPaymentLookup {
    async fn find_payment_by_sale_reference(&self, _reference: &str) -> Result<bool, AppError> {
        Ok(false)
    }
}

pub type ProcessorBreaker = StateMachine<
    failure_policy::ConsecutiveFailures<backoff::Exponential>,
    (),
>;

/// Circuit breaker for payment processor calls.
///
/// Opens after 5 consecutive failures and retries after an exponential
/// backoff between 10s and 60s.
pub fn create_processor_circuit_breaker() -> ProcessorBreaker {
    let backoff_strategy = backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));
    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

#[derive(Debug, Deserialize)]
struct PaymentIntentSearch {
    #[serde(default)]
    data: Vec<PaymentIntent>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    status: String,
}

/// Stripe PaymentIntent search keyed on the `so` metadata entry.
pub struct StripePaymentLookup {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    breaker: ProcessorBreaker,
}

impl StripePaymentLookup {
    pub fn new(base_url: String, secret_key: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Stripe client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
            breaker: create_processor_circuit_breaker(),
        })
    }

    async fn search(&self, reference: &str) -> Result<bool, AppError> {
        let url = format!("{}/v1/payment_intents/search", self.base_url);
        let query = search_query(reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .query(&[("query", query.as_str())])
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Stripe request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Stripe returned {}",
                response.status()
            )));
        }

        let search: PaymentIntentSearch = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Stripe response: {}", e))
        })?;

        Ok(search
            .data
            .iter()
            .any(|intent| intent.status == "succeeded"))
    }

    async fn retrieve(&self, intent_id: &str) -> Result<Option<serde_json::Value>, AppError> {
        let url = format!("{}/v1/payment_intents/{}", self.base_url, intent_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Stripe request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Stripe returned {}",
                response.status()
            )));
        }

        let intent = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Stripe response: {}", e))
        })?;
        Ok(Some(intent))
    }

    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match failsafe::futures::CircuitBreaker::call(&self.breaker, call).await {
            Ok(value) => Ok(value),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(AppError::ExternalApiError(
                "payment processor circuit open".to_string(),
            )),
        }
    }
}

/// Stripe search expression matching intents created for one order.
pub fn search_query(reference: &str) -> String {
    format!("metadata['so']:'{}'", reference.replace('\'', "\\'"))
}

#[async_trait]
impl PaymentStatusLookup for StripePaymentLookup {
    async fn find_payment_by_sale_reference(&self, reference: &str) -> Result<bool, AppError> {
        self.guarded(self.search(reference)).await
    }

    async fn get_payment_intent(&self, intent_id: &str) -> Result<Option<serde_json::Value>, AppError> {
        let id = validate_intent_id(intent_id)?;
        self.guarded(self.retrieve(id)).await
    }
}
