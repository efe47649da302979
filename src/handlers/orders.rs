use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::orders::{
    CreateOrderRequest, OrderConfirmation, OrderDetails, OrderListResponse,
};
use crate::{ApiResponse, AppState, ListQuery};

/// Create an order from the current cart and open its payment intent
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    description = "Prices a cart submission, persists the order and returns the payment client secret",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created and payment intent opened", body = ApiResponse<OrderConfirmation>),
        (status = 400, description = "Validation failure, price mismatch or restaurant not payable", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing/invalid token, or claimed user differs from the token", body = crate::errors::ErrorResponse),
        (status = 402, description = "Order persisted but payment setup failed; retry via /orders/{id}/pay", body = crate::errors::ErrorResponse),
        (status = 409, description = "Wallet balance changed during checkout", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderConfirmation>>), ServiceError> {
    // Reject identity mismatches before any pricing or persistence work and
    // log them; a caller claiming someone else's id is an abuse signal.
    if request.user_id != auth_user.user_id {
        warn!(
            claimed_user_id = %request.user_id,
            authenticated_user_id = %auth_user.user_id,
            "Rejected order claiming another user's identity"
        );
        return Err(ServiceError::AuthorizationError(format!(
            "User mismatch: request claims {}, token claims {}",
            request.user_id, auth_user.user_id
        )));
    }

    let confirmation = state.services.orders.create_order(&auth_user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(confirmation))))
}

/// Retry payment setup for a pending order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/pay",
    summary = "Retry payment setup",
    description = "Re-opens the payment intent for an order left pending by a failed gateway call; idempotent per order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Payment intent available", body = ApiResponse<OrderConfirmation>),
        (status = 400, description = "Order is not awaiting payment", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment setup failed again", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn retry_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderConfirmation>>, ServiceError> {
    let confirmation = state.services.orders.retry_payment(&auth_user, id).await?;
    Ok(Json(ApiResponse::success(confirmation)))
}

/// Get one of the caller's orders, lines included
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderDetails>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderDetails>>, ServiceError> {
    let details = state.services.orders.get_order(&auth_user, id).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// List the caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<OrderListResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let result = state
        .services
        .orders
        .list_orders(&auth_user, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}
