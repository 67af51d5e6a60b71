//! Stripe implementation of the PaymentGateway port.
//!
//! Creates PaymentIntents through the REST API. Settlement outcomes come
//! back through the webhook endpoint, not through this client.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use crate::config::PaymentConfig;
use crate::domain::billing::PaymentMethod;
use crate::ports::{
    CreatePaymentIntentRequest, PaymentError, PaymentErrorCode, PaymentGateway, PaymentIntent,
};

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: Secret<String>,

    /// Lowercase ISO currency code sent with every intent.
    currency: String,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            currency: currency.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

impl From<&PaymentConfig> for StripeConfig {
    fn from(config: &PaymentConfig) -> Self {
        Self {
            api_key: config.stripe_api_key.clone(),
            currency: config.currency.to_lowercase(),
            api_base_url: config
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        }
    }
}

/// Stripe payment gateway adapter.
pub struct StripePaymentGateway {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentGateway {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }
}

/// Subset of the PaymentIntent object returned by Stripe.
#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl PaymentGateway for StripePaymentGateway {
    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError> {
        let url = format!("{}/v1/payment_intents", self.config.api_base_url);
        let params = intent_params(&request, &self.config.currency)?;

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                idempotency_key = %request.idempotency_key,
                "Stripe create_payment_intent failed"
            );
            return Err(error_from_response(status, &body));
        }

        let intent: StripePaymentIntent = response.json().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
        })?;

        tracing::info!(
            payment_intent = %intent.id,
            status = %intent.status,
            "Stripe payment intent created"
        );

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
            status: intent.status,
        })
    }
}

/// Builds the form body for `POST /v1/payment_intents`.
fn intent_params(
    request: &CreatePaymentIntentRequest,
    currency: &str,
) -> Result<Vec<(String, String)>, PaymentError> {
    let method_type = stripe_method_type(request.method).ok_or_else(|| {
        PaymentError::invalid_request(format!(
            "Payment method {} is not supported by the gateway",
            request.method
        ))
    })?;

    let mut params = vec![
        ("amount".to_string(), request.amount.cents().to_string()),
        ("currency".to_string(), currency.to_string()),
        ("payment_method_types[]".to_string(), method_type.to_string()),
        ("description".to_string(), request.description.clone()),
    ];

    // Sorted so the body is stable across retries with the same key.
    let mut metadata: Vec<_> = request.metadata.iter().collect();
    metadata.sort();
    for (key, value) in metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
    }

    Ok(params)
}

fn stripe_method_type(method: PaymentMethod) -> Option<&'static str> {
    match method {
        PaymentMethod::Pix => Some("pix"),
        PaymentMethod::CreditCard | PaymentMethod::DebitCard => Some("card"),
        PaymentMethod::BankTransfer | PaymentMethod::Cash => None,
    }
}

fn error_from_response(status: StatusCode, body: &str) -> PaymentError {
    let detail = serde_json::from_str::<StripeErrorBody>(body).ok().map(|b| b.error);
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| format!("Stripe API error: {}", status));

    let code = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PaymentErrorCode::AuthenticationError,
        StatusCode::TOO_MANY_REQUESTS => PaymentErrorCode::RateLimitExceeded,
        s if s.is_client_error() => PaymentErrorCode::InvalidRequest,
        _ => PaymentErrorCode::ProviderError,
    };

    let error = PaymentError::new(code, message);
    match detail.and_then(|d| d.code) {
        Some(provider_code) => error.with_provider_code(provider_code),
        None => error,
    }
}
