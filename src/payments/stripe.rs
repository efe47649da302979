//! Live Stripe gateway client.
//!
//! Talks to the Stripe REST API directly (form-encoded bodies, bearer auth),
//! forwards the caller's idempotency key on every mutating call and bounds
//! each request with the configured timeout. Destination charges carry the
//! platform commission as `application_fee_amount` and transfer the remainder
//! to the restaurant's connected account.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use super::{
    PaymentError, PaymentGateway, PaymentIntentHandle, PaymentIntentRequest, PaymentMethodSummary,
};
use crate::errors::ServiceError;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    client_secret: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeSetupIntent {
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeCard {
    brand: Option<String>,
    last4: Option<String>,
    exp_month: Option<u8>,
    exp_year: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentMethod {
    id: String,
    card: Option<StripeCard>,
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

impl StripeGateway {
    pub fn new(secret_key: String, timeout: Duration) -> Result<Self, ServiceError> {
        Self::with_base_url(secret_key, timeout, STRIPE_API_BASE.to_string())
    }

    /// Overrides the API base URL; used to point the client at a test server.
    pub fn with_base_url(
        secret_key: String,
        timeout: Duration,
        base_url: String,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            http,
            secret_key,
            base_url,
        })
    }

    fn map_transport_error(err: reqwest::Error) -> PaymentError {
        if err.is_timeout() {
            PaymentError::Timeout
        } else {
            PaymentError::Transport(err.to_string())
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();
        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| PaymentError::Transport(format!("malformed gateway response: {e}")))
        } else {
            let message = response
                .json::<StripeErrorEnvelope>()
                .await
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            Err(PaymentError::Rejected(message))
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, PaymentError> {
        let mut request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .form(params);

        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }

        let response = request.send().await.map_err(Self::map_transport_error)?;
        Self::decode(response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, PaymentError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        Self::decode(response).await
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self))]
    async fn get_or_create_customer(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<String, PaymentError> {
        // Customer creation is keyed per user, so a repeated call returns the
        // customer minted by the first one instead of creating another.
        let params = [
            ("email", email.to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];
        let customer: StripeCustomer = self
            .post_form(
                "/customers",
                &params,
                Some(&format!("customer:{user_id}")),
            )
            .await?;
        Ok(customer.id)
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntentHandle, PaymentError> {
        let params = [
            ("amount", request.amount_cents.to_string()),
            ("currency", "eur".to_string()),
            ("customer", request.customer_ref.clone()),
            ("description", request.description.clone()),
            (
                "application_fee_amount",
                request.application_fee_cents.to_string(),
            ),
            (
                "transfer_data[destination]",
                request.restaurant_account.clone(),
            ),
            ("transfer_data[amount]", request.transfer_cents().to_string()),
            ("metadata[order_id]", request.order_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];

        let intent: StripePaymentIntent = self
            .post_form(
                "/payment_intents",
                &params,
                Some(&request.idempotency_key()),
            )
            .await?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            PaymentError::Transport("payment intent response missing client secret".to_string())
        })?;

        Ok(PaymentIntentHandle {
            payment_intent_id: intent.id,
            client_secret,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<String, PaymentError> {
        let intent: StripePaymentIntent = self
            .get(&format!("/payment_intents/{payment_intent_id}"))
            .await?;
        Ok(intent.status)
    }

    #[instrument(skip(self))]
    async fn create_setup_intent(&self, customer_ref: &str) -> Result<String, PaymentError> {
        let params = [
            ("customer", customer_ref.to_string()),
            ("usage", "off_session".to_string()),
        ];
        let intent: StripeSetupIntent = self
            .post_form(
                "/setup_intents",
                &params,
                Some(&format!("setup:{customer_ref}")),
            )
            .await?;
        intent.client_secret.ok_or_else(|| {
            PaymentError::Transport("setup intent response missing client secret".to_string())
        })
    }

    #[instrument(skip(self))]
    async fn list_payment_methods(
        &self,
        customer_ref: &str,
    ) -> Result<Vec<PaymentMethodSummary>, PaymentError> {
        let list: StripeList<StripePaymentMethod> = self
            .get(&format!(
                "/customers/{customer_ref}/payment_methods?type=card"
            ))
            .await?;

        Ok(list
            .data
            .into_iter()
            .map(|method| {
                let card = method.card.unwrap_or(StripeCard {
                    brand: None,
                    last4: None,
                    exp_month: None,
                    exp_year: None,
                });
                PaymentMethodSummary {
                    id: method.id,
                    brand: card.brand,
                    last4: card.last4,
                    exp_month: card.exp_month,
                    exp_year: card.exp_year,
                }
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn detach_payment_method(&self, payment_method_id: &str) -> Result<(), PaymentError> {
        let _: StripePaymentMethod = self
            .post_form(
                &format!("/payment_methods/{payment_method_id}/detach"),
                &[],
                None,
            )
            .await?;
        Ok(())
    }
}
