use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::payments::PaymentMethodSummary;
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetupIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DetachResponse {
    pub id: String,
    pub detached: bool,
}

/// Start saving a card for later off-session use
#[utoipa::path(
    post,
    path = "/api/v1/payments/setup-intent",
    summary = "Create setup intent",
    responses(
        (status = 200, description = "Setup intent created", body = ApiResponse<SetupIntentResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 402, description = "Gateway call failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_setup_intent(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<SetupIntentResponse>>, ServiceError> {
    let customer = state
        .services
        .gateway
        .get_or_create_customer(auth_user.user_id, &auth_user.email)
        .await?;
    let client_secret = state.services.gateway.create_setup_intent(&customer).await?;

    Ok(Json(ApiResponse::success(SetupIntentResponse {
        client_secret,
    })))
}

/// List the caller's saved payment methods
#[utoipa::path(
    get,
    path = "/api/v1/payments/methods",
    summary = "List payment methods",
    responses(
        (status = 200, description = "Payment methods retrieved", body = ApiResponse<Vec<PaymentMethodSummary>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 402, description = "Gateway call failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_payment_methods(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<PaymentMethodSummary>>>, ServiceError> {
    let customer = state
        .services
        .gateway
        .get_or_create_customer(auth_user.user_id, &auth_user.email)
        .await?;
    let methods = state.services.gateway.list_payment_methods(&customer).await?;

    Ok(Json(ApiResponse::success(methods)))
}

/// Detach a saved payment method
#[utoipa::path(
    delete,
    path = "/api/v1/payments/methods/{id}",
    summary = "Detach payment method",
    params(("id" = String, Path, description = "Payment method id")),
    responses(
        (status = 200, description = "Payment method detached", body = ApiResponse<DetachResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 402, description = "Gateway call failed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn detach_payment_method(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _auth_user: AuthUser,
) -> Result<Json<ApiResponse<DetachResponse>>, ServiceError> {
    state.services.gateway.detach_payment_method(&id).await?;

    Ok(Json(ApiResponse::success(DetachResponse {
        id,
        detached: true,
    })))
}
