use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::order::OrderStatus;

/// Error payload returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Bad Request", "Unauthorized")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Illegal status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            // Signature failures must not be acknowledged as delivered, so
            // they surface as 400 rather than 200.
            ServiceError::ValidationError(_) | ServiceError::InvalidSignature(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            ServiceError::DatabaseError(_)
            | ServiceError::PaymentProvider(_)
            | ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            // Never leak driver or provider internals to callers.
            ServiceError::DatabaseError(_) => "A storage error occurred".to_string(),
            ServiceError::PaymentProvider(_) => {
                "The payment provider could not be reached".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
            message: self.public_message(),
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}
