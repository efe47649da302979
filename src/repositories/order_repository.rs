//! Persistence boundary for the ordering pipeline.
//!
//! The order header, every order line and the wallet debit commit as one
//! transaction: partial orders are never observable, and the conditional
//! wallet debit closes the race where two concurrent checkouts both read the
//! same stale balance.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::{menu_item, order_item, restaurant, wallet};
use crate::errors::ServiceError;
use crate::money::PricingBreakdown;
use crate::services::validation::ValidatedOrder;

const ESTIMATED_DELIVERY_MINUTES: i64 = 35;

#[derive(Clone)]
pub struct OrderRepository {
    db: Arc<DbPool>,
}

impl OrderRepository {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn find_restaurant(
        &self,
        restaurant_id: Uuid,
    ) -> Result<Option<restaurant::Model>, ServiceError> {
        Ok(restaurant::Entity::find_by_id(restaurant_id)
            .one(&*self.db)
            .await?)
    }

    /// Current menu prices for a restaurant, available items only.
    pub async fn menu_prices(
        &self,
        restaurant_id: Uuid,
    ) -> Result<HashMap<Uuid, Decimal>, ServiceError> {
        let items = menu_item::Entity::find()
            .filter(menu_item::Column::RestaurantId.eq(restaurant_id))
            .filter(menu_item::Column::IsAvailable.eq(true))
            .all(&*self.db)
            .await?;

        Ok(items.into_iter().map(|item| (item.id, item.price)).collect())
    }

    /// Snapshot of a user's wallet balance; absent wallet rows read as zero.
    pub async fn wallet_balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        let balance = wallet::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .map(|row| row.balance)
            .unwrap_or(Decimal::ZERO);
        Ok(balance)
    }

    /// Creates the order header, all lines and the wallet debit atomically.
    ///
    /// The debit is conditional on the balance still covering the applied
    /// credit; if another checkout spent it first, the whole transaction is
    /// rolled back and the caller may re-price and retry.
    #[instrument(skip(self, validated, breakdown), fields(user_id = %validated.user_id, restaurant_id = %validated.restaurant_id))]
    pub async fn create_order(
        &self,
        validated: &ValidatedOrder,
        breakdown: &PricingBreakdown,
    ) -> Result<order::Model, ServiceError> {
        let address_json = serde_json::to_string(&validated.delivery_address)
            .map_err(|e| ServiceError::InternalError(format!("address serialization: {e}")))?;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let order_number = format!("ORD-{}", order_id.to_string()[..8].to_uppercase());

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            user_id: Set(validated.user_id),
            restaurant_id: Set(validated.restaurant_id),
            delivery_address: Set(address_json),
            delivery_instructions: Set(validated.delivery_instructions.clone()),
            subtotal: Set(breakdown.subtotal()),
            delivery_fee: Set(breakdown.delivery_fee()),
            service_fee: Set(breakdown.service_fee()),
            promo_discount: Set(Decimal::ZERO),
            wallet_credit_used: Set(breakdown.wallet_credit()),
            total: Set(breakdown.total()),
            cashback_rate: Set(breakdown.cashback_rate()),
            cashback_amount: Set(breakdown.cashback()),
            status: Set(OrderStatus::Pending.to_string()),
            payment_method: Set(None),
            payment_status: Set(PaymentStatus::Pending.to_string()),
            payment_intent_id: Set(None),
            estimated_delivery_at: Set(now + Duration::minutes(ESTIMATED_DELIVERY_MINUTES)),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert order header");
            ServiceError::DatabaseError(e)
        })?;

        for line in &validated.lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                menu_item_id: Set(line.menu_item_id),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                options_price: Set(line.options_price),
                total_price: Set(line.line_total()),
                options: Set(line.options.clone()),
                special_instructions: Set(line.special_instructions.clone()),
                created_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, menu_item_id = %line.menu_item_id, "Failed to insert order line");
                ServiceError::DatabaseError(e)
            })?;
        }

        if breakdown.wallet_credit_cents > 0 {
            let credit = breakdown.wallet_credit();
            let result = wallet::Entity::update_many()
                .col_expr(
                    wallet::Column::Balance,
                    Expr::col(wallet::Column::Balance).sub(Expr::value(credit)),
                )
                .col_expr(wallet::Column::UpdatedAt, Expr::value(now))
                .filter(wallet::Column::UserId.eq(validated.user_id))
                .filter(wallet::Column::Balance.gte(credit))
                .exec(&txn)
                .await?;

            if result.rows_affected == 0 {
                warn!(
                    user_id = %validated.user_id,
                    credit = %credit,
                    "Wallet balance no longer covers the applied credit; rolling back"
                );
                txn.rollback().await?;
                return Err(ServiceError::WalletConflict(
                    "Wallet balance changed during checkout; please retry".to_string(),
                ));
            }
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        Ok(order_model)
    }

    /// Narrow update of the payment-intent reference, the only column that
    /// changes after the initial insert. Safe to repeat.
    #[instrument(skip(self))]
    pub async fn attach_payment_intent(
        &self,
        order_id: Uuid,
        payment_intent_id: &str,
    ) -> Result<(), ServiceError> {
        order::Entity::update_many()
            .col_expr(
                order::Column::PaymentIntentId,
                Expr::value(Some(payment_intent_id.to_string())),
            )
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Owner-scoped read; an order is invisible to anyone but its owner.
    pub async fn get_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }
}
