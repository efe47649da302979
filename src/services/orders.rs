//! Order checkout orchestration.
//!
//! One submission walks a fixed pipeline: validate → price → persist → open
//! payment intent → attach the intent to the order row. Each step depends on
//! the previous one, so the pipeline is strictly sequential. It does not
//! compensate automatically: when payment setup fails after persistence the
//! order stays `pending`/`pending` and the caller retries through
//! [`OrderService::retry_payment`], which reuses the order-keyed idempotency
//! key so a retry can never open a second charge.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::entities::{order, order_item};
use crate::entities::order::PaymentStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money;
use crate::payments::{PaymentGateway, PaymentIntentHandle, PaymentIntentRequest};
use crate::repositories::OrderRepository;
use crate::services::validation;

/// Raw order submission, exactly as posted by the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub restaurant_id: Uuid,
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
    pub delivery_address: Option<DeliveryAddress>,
    pub delivery_instructions: Option<String>,
    pub wallet_amount_to_apply: Option<Decimal>,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemInput {
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub options_price: Option<Decimal>,
    pub options: Option<Value>,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub formatted: String,
    pub place_id: String,
    pub street_address: String,
    pub city: String,
    pub postal_code: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Client-facing view of a persisted order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub restaurant_id: Uuid,
    pub delivery_address: Option<DeliveryAddress>,
    pub delivery_instructions: Option<String>,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub service_fee: Decimal,
    pub promo_discount: Decimal,
    pub wallet_credit_used: Decimal,
    pub total: Decimal,
    pub cashback_rate: Decimal,
    pub cashback_amount: Decimal,
    pub status: String,
    pub payment_status: String,
    pub payment_intent_id: Option<String>,
    pub estimated_delivery_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OrderResponse {
    fn from_model(model: &order::Model) -> Self {
        Self {
            id: model.id,
            order_number: model.order_number.clone(),
            user_id: model.user_id,
            restaurant_id: model.restaurant_id,
            delivery_address: serde_json::from_str(&model.delivery_address).ok(),
            delivery_instructions: model.delivery_instructions.clone(),
            subtotal: model.subtotal,
            delivery_fee: model.delivery_fee,
            service_fee: model.service_fee,
            promo_discount: model.promo_discount,
            wallet_credit_used: model.wallet_credit_used,
            total: model.total,
            cashback_rate: model.cashback_rate,
            cashback_amount: model.cashback_amount,
            status: model.status.clone(),
            payment_status: model.payment_status.clone(),
            payment_intent_id: model.payment_intent_id.clone(),
            estimated_delivery_at: model.estimated_delivery_at,
            created_at: model.created_at,
        }
    }
}

/// Successful checkout: the persisted order plus the client secret the app
/// hands to the payment sheet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderConfirmation {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderLineResponse {
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub options_price: Decimal,
    pub total_price: Decimal,
    pub special_instructions: Option<String>,
}

impl OrderLineResponse {
    fn from_model(model: &order_item::Model) -> Self {
        Self {
            menu_item_id: model.menu_item_id,
            name: model.name.clone(),
            quantity: model.quantity,
            unit_price: model.unit_price,
            options_price: model.options_price,
            total_price: model.total_price,
            special_instructions: model.special_instructions.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderLineResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Orchestrates checkout across validation, pricing, persistence and the
/// payment gateway.
#[derive(Clone)]
pub struct OrderService {
    repository: OrderRepository,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            repository: OrderRepository::new(db),
            gateway,
            event_sender,
        }
    }

    /// Prices, persists and opens payment for a cart submission.
    #[instrument(skip(self, auth, request), fields(user_id = %auth.user_id, restaurant_id = %request.restaurant_id))]
    pub async fn create_order(
        &self,
        auth: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<OrderConfirmation, ServiceError> {
        let restaurant = self
            .repository
            .find_restaurant(request.restaurant_id)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Restaurant not found".to_string()))?;
        if !restaurant.is_active {
            return Err(ServiceError::ValidationError(
                "Restaurant is not accepting orders".to_string(),
            ));
        }

        let catalog = self.repository.menu_prices(request.restaurant_id).await?;
        let wallet_balance = self.repository.wallet_balance(auth.user_id).await?;

        let validated = validation::validate_order(&request, auth, &catalog, &restaurant)?;

        let priced_lines: Vec<_> = validated.lines.iter().map(|line| line.priced()).collect();
        let breakdown = money::compute_breakdown(
            &priced_lines,
            restaurant.delivery_fee,
            validated.wallet_claim,
            wallet_balance,
        );

        if breakdown.wallet_overclaimed {
            warn!(
                user_id = %auth.user_id,
                claimed = %validated.wallet_claim,
                balance = %wallet_balance,
                "Wallet claim exceeds balance; clamping applied credit"
            );
            self.notify(Event::WalletOverclaimAttempted {
                user_id: auth.user_id,
                claimed: validated.wallet_claim,
                balance: wallet_balance,
            })
            .await;
        }

        let order = self.repository.create_order(&validated, &breakdown).await?;
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "Order persisted"
        );
        self.notify(Event::OrderCreated(order.id)).await;
        if breakdown.wallet_credit_cents > 0 {
            self.notify(Event::WalletCreditApplied {
                order_id: order.id,
                user_id: auth.user_id,
                amount: breakdown.wallet_credit(),
            })
            .await;
        }

        // The restaurant account was checked during validation.
        let account = restaurant.stripe_account_id.clone().unwrap_or_default();
        let handle = self.initiate_payment(&order, &account, &auth.email).await?;

        let mut response = OrderResponse::from_model(&order);
        response.payment_intent_id = Some(handle.payment_intent_id);
        Ok(OrderConfirmation {
            order: response,
            client_secret: handle.client_secret,
        })
    }

    /// Re-drives payment setup for an order whose gateway call failed.
    ///
    /// The idempotency key is derived from the existing order id, so however
    /// many times this runs the processor holds at most one intent.
    #[instrument(skip(self, auth), fields(user_id = %auth.user_id, order_id = %order_id))]
    pub async fn retry_payment(
        &self,
        auth: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderConfirmation, ServiceError> {
        let order = self.repository.get_order(order_id, auth.user_id).await?;

        if order.payment_status != PaymentStatus::Pending.to_string() {
            return Err(ServiceError::ValidationError(format!(
                "Order {} is not awaiting payment",
                order.order_number
            )));
        }

        let restaurant = self
            .repository
            .find_restaurant(order.restaurant_id)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Restaurant not found".to_string()))?;
        let account = restaurant
            .stripe_account_id
            .as_deref()
            .map(str::trim)
            .filter(|account| !account.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::RestaurantNotPayable(format!(
                    "{} cannot accept card payments yet; try another restaurant",
                    restaurant.name
                ))
            })?;

        let handle = self.initiate_payment(&order, &account, &auth.email).await?;

        let mut response = OrderResponse::from_model(&order);
        response.payment_intent_id = Some(handle.payment_intent_id);
        Ok(OrderConfirmation {
            order: response,
            client_secret: handle.client_secret,
        })
    }

    pub async fn get_order(
        &self,
        auth: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderDetails, ServiceError> {
        let order = self.repository.get_order(order_id, auth.user_id).await?;
        let items = self.repository.get_order_items(order_id).await?;

        Ok(OrderDetails {
            order: OrderResponse::from_model(&order),
            items: items.iter().map(OrderLineResponse::from_model).collect(),
        })
    }

    pub async fn list_orders(
        &self,
        auth: &AuthUser,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let (orders, total) = self
            .repository
            .list_orders(auth.user_id, page.max(1), per_page)
            .await?;

        Ok(OrderListResponse {
            orders: orders.iter().map(OrderResponse::from_model).collect(),
            total,
            page: page.max(1),
            per_page,
        })
    }

    /// Opens the split payment intent for a persisted order and attaches the
    /// intent reference. The charge is the pre-credit amount (subtotal +
    /// delivery + service fee); commission comes from the pricing module off
    /// the stored subtotal, never recomputed ad hoc.
    async fn initiate_payment(
        &self,
        order: &order::Model,
        restaurant_account: &str,
        email: &str,
    ) -> Result<PaymentIntentHandle, ServiceError> {
        let subtotal_cents = money::to_cents(order.subtotal);
        let amount_cents = subtotal_cents
            + money::to_cents(order.delivery_fee)
            + money::to_cents(order.service_fee);
        let application_fee_cents = money::commission_cents(subtotal_cents);

        let customer_ref = match self.gateway.get_or_create_customer(order.user_id, email).await {
            Ok(customer_ref) => customer_ref,
            Err(e) => return Err(self.payment_failure(order, e.to_string()).await),
        };

        let intent_request = PaymentIntentRequest {
            order_id: order.id,
            user_id: order.user_id,
            customer_ref,
            restaurant_account: restaurant_account.to_string(),
            amount_cents,
            application_fee_cents,
            description: format!("Tavolo order {}", order.order_number),
        };

        let handle = match self.gateway.create_payment_intent(&intent_request).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.payment_failure(order, e.to_string()).await),
        };

        self.repository
            .attach_payment_intent(order.id, &handle.payment_intent_id)
            .await?;

        info!(
            order_id = %order.id,
            payment_intent_id = %handle.payment_intent_id,
            amount_cents,
            application_fee_cents,
            "Payment intent created"
        );
        self.notify(Event::PaymentIntentCreated {
            order_id: order.id,
            payment_intent_id: handle.payment_intent_id.clone(),
        })
        .await;

        Ok(handle)
    }

    /// Records a failed payment setup. The order row stays pending and
    /// visible, so the failure is recoverable rather than silently lost.
    async fn payment_failure(&self, order: &order::Model, reason: String) -> ServiceError {
        error!(
            order_id = %order.id,
            user_id = %order.user_id,
            stage = "payment_setup",
            reason = %reason,
            "Payment setup failed; order remains pending"
        );
        self.notify(Event::PaymentSetupFailed {
            order_id: order.id,
            reason: reason.clone(),
        })
        .await;
        ServiceError::PaymentSetupFailed(reason)
    }

    async fn notify(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send event");
            }
        }
    }
}
