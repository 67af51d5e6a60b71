//! Mock payment gateway for testing.
//!
//! Supports:
//! - Deterministic intent ids, one per idempotency key
//! - Error injection
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::ports::{CreatePaymentIntentRequest, PaymentError, PaymentGateway, PaymentIntent};

/// Mock payment gateway.
///
/// Repeating a request with the same idempotency key returns the same
/// intent, like the real gateway does.
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Intents already created, by idempotency key.
    intents: HashMap<String, PaymentIntent>,

    /// Error to return on next call.
    next_error: Option<PaymentError>,

    /// Every request received, in order.
    call_log: Vec<CreatePaymentIntentRequest>,

    counter: u64,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Set an error to return on the next call.
    pub fn set_error(&self, error: PaymentError) {
        self.state().next_error = Some(error);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// All requests received so far.
    pub fn calls(&self) -> Vec<CreatePaymentIntentRequest> {
        self.state().call_log.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().call_log.len()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut state = self.state();
        state.call_log.push(request.clone());

        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        if let Some(existing) = state.intents.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        state.counter += 1;
        let id = format!("pi_mock_{:06}", state.counter);
        let intent = PaymentIntent {
            client_secret: Some(format!("{}_secret_mock", id)),
            id,
            status: "requires_payment_method".to_string(),
        };
        state
            .intents
            .insert(request.idempotency_key.clone(), intent.clone());
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::PaymentMethod;
    use crate::domain::foundation::Money;

    fn request(key: &str) -> CreatePaymentIntentRequest {
        CreatePaymentIntentRequest {
            amount: Money::from_cents(2_500).unwrap(),
            method: PaymentMethod::Pix,
            description: "test".to_string(),
            metadata: HashMap::new(),
            idempotency_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn same_key_returns_same_intent() {
        let gateway = MockPaymentGateway::new();

        let first = gateway.create_payment_intent(request("k1")).await.unwrap();
        let again = gateway.create_payment_intent(request("k1")).await.unwrap();
        let other = gateway.create_payment_intent(request("k2")).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first.id, other.id);
        assert!(first.client_secret.is_some());
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test]
    async fn injected_error_is_returned_once() {
        let gateway = MockPaymentGateway::new();
        gateway.set_error(PaymentError::network("connection reset"));

        let err = gateway.create_payment_intent(request("k1")).await.unwrap_err();
        assert!(err.retryable);

        assert!(gateway.create_payment_intent(request("k1")).await.is_ok());
        assert_eq!(gateway.calls().len(), 2);
    }
}
