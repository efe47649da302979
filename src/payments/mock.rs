//! Deterministic in-memory payment gateway.
//!
//! Stands in for the live gateway when no secret key is configured, and backs
//! the test suite. Mirrors the processor's idempotency semantics: a repeated
//! create under the same key replays the stored intent instead of opening a
//! second charge.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

use super::{
    PaymentError, PaymentGateway, PaymentIntentHandle, PaymentIntentRequest, PaymentMethodSummary,
};

#[derive(Default)]
pub struct MockGateway {
    customers: DashMap<Uuid, String>,
    /// Stored intents keyed by idempotency key
    intents: DashMap<String, PaymentIntentHandle>,
    intent_creates: AtomicU64,
    fail_next_intent: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of intents actually opened (idempotent replays excluded).
    pub fn created_intent_count(&self) -> u64 {
        self.intent_creates.load(Ordering::SeqCst)
    }

    /// Makes the next `create_payment_intent` call fail with a timeout,
    /// simulating an unreachable processor.
    pub fn fail_next_payment_intent(&self) {
        self.fail_next_intent.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn get_or_create_customer(
        &self,
        user_id: Uuid,
        _email: &str,
    ) -> Result<String, PaymentError> {
        let customer = self
            .customers
            .entry(user_id)
            .or_insert_with(|| format!("cus_mock_{}", user_id.simple()));
        Ok(customer.clone())
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntentHandle, PaymentError> {
        if self.fail_next_intent.swap(false, Ordering::SeqCst) {
            return Err(PaymentError::Timeout);
        }

        let key = request.idempotency_key();
        if let Some(existing) = self.intents.get(&key) {
            return Ok(existing.clone());
        }

        self.intent_creates.fetch_add(1, Ordering::SeqCst);
        let handle = PaymentIntentHandle {
            payment_intent_id: format!("pi_mock_{}", request.order_id.simple()),
            client_secret: format!("pi_mock_{}_secret", request.order_id.simple()),
        };
        self.intents.insert(key, handle.clone());
        Ok(handle)
    }

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<String, PaymentError> {
        let known = self
            .intents
            .iter()
            .any(|entry| entry.value().payment_intent_id == payment_intent_id);
        if known {
            Ok("requires_confirmation".to_string())
        } else {
            Err(PaymentError::Rejected(format!(
                "no such payment intent: {payment_intent_id}"
            )))
        }
    }

    async fn create_setup_intent(&self, customer_ref: &str) -> Result<String, PaymentError> {
        Ok(format!("seti_mock_{customer_ref}_secret"))
    }

    async fn list_payment_methods(
        &self,
        _customer_ref: &str,
    ) -> Result<Vec<PaymentMethodSummary>, PaymentError> {
        Ok(Vec::new())
    }

    async fn detach_payment_method(&self, _payment_method_id: &str) -> Result<(), PaymentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent_request(order_id: Uuid) -> PaymentIntentRequest {
        PaymentIntentRequest {
            order_id,
            user_id: Uuid::new_v4(),
            customer_ref: "cus_mock_test".to_string(),
            restaurant_account: "acct_test".to_string(),
            amount_cents: 1_579,
            application_fee_cents: 75,
            description: "Order ORD-TEST".to_string(),
        }
    }

    #[tokio::test]
    async fn repeated_create_under_one_key_opens_exactly_one_intent() {
        let gateway = MockGateway::new();
        let request = intent_request(Uuid::new_v4());

        let first = gateway.create_payment_intent(&request).await.unwrap();
        let second = gateway.create_payment_intent(&request).await.unwrap();

        assert_eq!(first.payment_intent_id, second.payment_intent_id);
        assert_eq!(first.client_secret, second.client_secret);
        assert_eq!(gateway.created_intent_count(), 1);
    }

    #[tokio::test]
    async fn distinct_orders_get_distinct_intents() {
        let gateway = MockGateway::new();

        let a = gateway
            .create_payment_intent(&intent_request(Uuid::new_v4()))
            .await
            .unwrap();
        let b = gateway
            .create_payment_intent(&intent_request(Uuid::new_v4()))
            .await
            .unwrap();

        assert_ne!(a.payment_intent_id, b.payment_intent_id);
        assert_eq!(gateway.created_intent_count(), 2);
    }

    #[tokio::test]
    async fn injected_failure_fires_once_then_clears() {
        let gateway = MockGateway::new();
        let request = intent_request(Uuid::new_v4());

        gateway.fail_next_payment_intent();
        let failed = gateway.create_payment_intent(&request).await;
        assert!(matches!(failed, Err(PaymentError::Timeout)));
        assert_eq!(gateway.created_intent_count(), 0);

        let recovered = gateway.create_payment_intent(&request).await;
        assert!(recovered.is_ok());
        assert_eq!(gateway.created_intent_count(), 1);
    }

    #[tokio::test]
    async fn customer_creation_is_idempotent_per_user() {
        let gateway = MockGateway::new();
        let user = Uuid::new_v4();

        let first = gateway.get_or_create_customer(user, "a@b.test").await.unwrap();
        let second = gateway.get_or_create_customer(user, "a@b.test").await.unwrap();

        assert_eq!(first, second);
    }
}
