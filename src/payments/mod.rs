//! Payment gateway capability.
//!
//! Two implementations sit behind [`PaymentGateway`]: a live Stripe-backed
//! client and a deterministic in-memory one. The choice is made once at
//! process start from configuration; business logic never branches on it.

pub mod mock;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

pub use mock::MockGateway;
pub use stripe::StripeGateway;

/// Failure modes of gateway calls. The caller decides retry policy; gateways
/// never retry internally.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment gateway timed out")]
    Timeout,

    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),

    #[error("payment gateway transport error: {0}")]
    Transport(String),
}

impl From<PaymentError> for ServiceError {
    fn from(err: PaymentError) -> Self {
        ServiceError::PaymentSetupFailed(err.to_string())
    }
}

/// Everything needed to open a split charge for one order.
#[derive(Debug, Clone)]
pub struct PaymentIntentRequest {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub customer_ref: String,
    /// The restaurant's connected gateway account, destination of the transfer
    pub restaurant_account: String,
    /// Full charge moved by the processor, in cents
    pub amount_cents: i64,
    /// Platform commission withheld from the transfer, in cents. Always the
    /// pricing module's figure; gateways never recompute it.
    pub application_fee_cents: i64,
    pub description: String,
}

impl PaymentIntentRequest {
    /// Deterministic idempotency key: a retried create for the same order
    /// must reach the processor under the same key and return the same
    /// intent rather than opening a second charge.
    pub fn idempotency_key(&self) -> String {
        format!("order:{}:payment-intent", self.order_id)
    }

    /// Amount transferred to the restaurant after the commission split.
    pub fn transfer_cents(&self) -> i64 {
        self.amount_cents - self.application_fee_cents
    }
}

/// Handle returned to the client so it can confirm the payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentHandle {
    pub payment_intent_id: String,
    pub client_secret: String,
}

/// A saved payment method, as shown on the checkout screen.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PaymentMethodSummary {
    pub id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u8>,
    pub exp_year: Option<u16>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the gateway customer reference for a user, creating one when
    /// missing. Idempotent per user.
    async fn get_or_create_customer(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<String, PaymentError>;

    /// Opens a payment intent carrying the commission split and restaurant
    /// transfer. Idempotent under the request's idempotency key.
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntentHandle, PaymentError>;

    /// Current processor-side status of an intent (e.g. after 3DS).
    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<String, PaymentError>;

    /// Client secret for saving a card off-session.
    async fn create_setup_intent(&self, customer_ref: &str) -> Result<String, PaymentError>;

    async fn list_payment_methods(
        &self,
        customer_ref: &str,
    ) -> Result<Vec<PaymentMethodSummary>, PaymentError>;

    async fn detach_payment_method(&self, payment_method_id: &str) -> Result<(), PaymentError>;
}

/// Selects the gateway implementation once at startup.
pub fn gateway_from_config(cfg: &AppConfig) -> Result<Arc<dyn PaymentGateway>, ServiceError> {
    match &cfg.stripe_secret_key {
        Some(secret) => {
            info!("Using live Stripe payment gateway");
            let gateway =
                StripeGateway::new(secret.clone(), Duration::from_secs(cfg.payment_timeout_secs))?;
            Ok(Arc::new(gateway))
        }
        None => {
            warn!("No payment gateway secret configured; using the in-memory gateway");
            Ok(Arc::new(MockGateway::new()))
        }
    }
}
