use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standard error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Bad Request", "Unauthorized")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Unified error type for the ordering pipeline.
///
/// `status_code` and `response_message` are the single source of truth for
/// HTTP mapping; nothing below the service layer leaks storage- or
/// gateway-specific detail to clients.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Missing or unverifiable bearer token.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Token verified but the claimed identity does not match it. Logged as a
    /// potential abuse signal at the call site; never silently corrected.
    #[error("Authorization error: {0}")]
    AuthorizationError(String),

    /// A caller-supplied unit price disagrees with the catalog.
    #[error("Price mismatch: {0}")]
    PriceMismatch(String),

    /// The restaurant has no payment-gateway account and cannot be paid out.
    #[error("Restaurant not payable: {0}")]
    RestaurantNotPayable(String),

    /// Payment gateway call failed or timed out. The order row, if already
    /// created, stays in a pending state and the operation may be retried.
    #[error("Payment setup failed: {0}")]
    PaymentSetupFailed(String),

    /// The wallet balance changed underneath the order transaction.
    #[error("Wallet conflict: {0}")]
    WalletConflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::PriceMismatch(_) | Self::RestaurantNotPayable(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::AuthenticationError(_) | Self::AuthorizationError(_) => StatusCode::UNAUTHORIZED,
            Self::PaymentSetupFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::WalletConflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Returns the message suitable for HTTP responses. Internal errors
    /// return generic messages so implementation details never leak.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::PaymentSetupFailed(_) | Self::WalletConflict(_)
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            request_id: crate::telemetry::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_facing_errors_keep_their_message() {
        let err = ServiceError::PriceMismatch("items[0].unit_price".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.response_message().contains("items[0].unit_price"));
    }

    #[test]
    fn database_errors_are_opaque_to_clients() {
        let err = ServiceError::DatabaseError(sea_orm::DbErr::Custom(
            "connection refused on 10.0.0.5".into(),
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.response_message(), "Database error");
        assert!(err.is_retryable());
    }

    #[test]
    fn identity_mismatch_maps_to_unauthorized() {
        let err = ServiceError::AuthorizationError("user mismatch".into());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(!err.is_retryable());
    }

    #[test]
    fn payment_setup_failure_is_retryable() {
        let err = ServiceError::PaymentSetupFailed("gateway timeout".into());
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert!(err.is_retryable());
    }
}
