//! Order input validation.
//!
//! Pure checks over an incoming order request; all reads (catalog prices,
//! restaurant profile, wallet balance) happen before this runs. Each failure
//! mode is distinct so the endpoint can answer with a precise 4xx. Checks run
//! in a fixed order: identity, structure, signs, catalog price agreement,
//! restaurant payability.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::restaurant;
use crate::errors::ServiceError;
use crate::money::{self, PricedLine};
use crate::services::orders::{CreateOrderRequest, DeliveryAddress};

/// Caller-supplied prices may differ from the catalog by at most one cent.
const PRICE_EPSILON: Decimal = dec!(0.01);
/// Sanity ceilings; keep cent arithmetic far from integer range.
const MAX_UNIT_PRICE: Decimal = dec!(10000);
const MAX_QUANTITY: i32 = 500;

/// An order request that passed every check. Prices are the catalog's, not
/// the caller's.
#[derive(Debug, Clone)]
pub struct ValidatedOrder {
    pub user_id: Uuid,
    pub restaurant_id: Uuid,
    pub lines: Vec<ValidatedLine>,
    pub delivery_address: DeliveryAddress,
    pub delivery_instructions: Option<String>,
    pub wallet_claim: Decimal,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatedLine {
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub options_price: Decimal,
    pub options: Option<Value>,
    pub special_instructions: Option<String>,
}

impl ValidatedLine {
    pub fn priced(&self) -> PricedLine {
        PricedLine {
            unit_price_cents: money::to_cents(self.unit_price),
            options_price_cents: money::to_cents(self.options_price),
            quantity: i64::from(self.quantity),
        }
    }

    pub fn line_total(&self) -> Decimal {
        (self.unit_price + self.options_price) * Decimal::from(self.quantity)
    }
}

pub fn validate_order(
    request: &CreateOrderRequest,
    auth: &AuthUser,
    catalog: &HashMap<Uuid, Decimal>,
    restaurant: &restaurant::Model,
) -> Result<ValidatedOrder, ServiceError> {
    // 1. Identity: the claimed user must be the authenticated one. Mismatches
    // are rejected, never corrected; the caller logs the abuse signal.
    if request.user_id != auth.user_id {
        return Err(ServiceError::AuthorizationError(format!(
            "User mismatch: request claims {}, token claims {}",
            request.user_id, auth.user_id
        )));
    }

    // 2. Structural completeness.
    if request.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "items array is required and cannot be empty".to_string(),
        ));
    }
    let delivery_address = request.delivery_address.clone().ok_or_else(|| {
        ServiceError::ValidationError("delivery_address is required".to_string())
    })?;

    let mut lines = Vec::with_capacity(request.items.len());
    for (index, item) in request.items.iter().enumerate() {
        if item.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "items[{index}].name is required"
            )));
        }

        // 3. Sign and range constraints. Negative prices or quantities would
        // turn checkout into a payout to the caller.
        if item.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "items[{index}].quantity must be a positive integer, got {}",
                item.quantity
            )));
        }
        if item.quantity > MAX_QUANTITY {
            return Err(ServiceError::ValidationError(format!(
                "items[{index}].quantity exceeds the maximum of {MAX_QUANTITY}"
            )));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "items[{index}].unit_price must be non-negative, got {}",
                item.unit_price
            )));
        }
        if item.unit_price > MAX_UNIT_PRICE {
            return Err(ServiceError::ValidationError(format!(
                "items[{index}].unit_price exceeds the maximum of {MAX_UNIT_PRICE}"
            )));
        }
        let options_price = item.options_price.unwrap_or(Decimal::ZERO);
        if options_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "items[{index}].options_price must be non-negative, got {options_price}"
            )));
        }

        // 4. Catalog agreement: the menu price is authoritative. The caller's
        // figure is accepted only as a staleness check within one cent.
        let catalog_price = catalog.get(&item.menu_item_id).copied().ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "items[{index}] references an unknown or unavailable menu item ({})",
                item.menu_item_id
            ))
        })?;
        if (item.unit_price - catalog_price).abs() > PRICE_EPSILON {
            return Err(ServiceError::PriceMismatch(format!(
                "items[{index}].unit_price ({}) does not match the menu price ({}) for {}",
                item.unit_price, catalog_price, item.name
            )));
        }

        lines.push(ValidatedLine {
            menu_item_id: item.menu_item_id,
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price: catalog_price,
            options_price,
            options: item.options.clone(),
            special_instructions: item.special_instructions.clone(),
        });
    }

    let wallet_claim = request.wallet_amount_to_apply.unwrap_or(Decimal::ZERO);
    if wallet_claim < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "wallet_amount_to_apply must be non-negative, got {wallet_claim}"
        )));
    }

    // 5. Restaurant payability: without a gateway account there is nowhere to
    // send the restaurant's share, so the order must not be created at all.
    let payable = restaurant
        .stripe_account_id
        .as_deref()
        .map(|account| !account.trim().is_empty())
        .unwrap_or(false);
    if !payable {
        return Err(ServiceError::RestaurantNotPayable(format!(
            "{} cannot accept card payments yet; try another restaurant",
            restaurant.name
        )));
    }

    Ok(ValidatedOrder {
        user_id: request.user_id,
        restaurant_id: request.restaurant_id,
        lines,
        delivery_address,
        delivery_instructions: request.delivery_instructions.clone(),
        wallet_claim,
        promo_code: request.promo_code.clone(),
    })
}
