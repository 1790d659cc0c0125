//! Error handling for the inventory ledger service
//!
//! Every state-changing failure carries enough detail (current balance,
//! requested quantity) for the caller to build a user-facing message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use shared::{BalanceError, FieldError};
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid quantity: {message}")]
    InvalidQuantity { quantity: Decimal, message: String },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Ledger errors
    #[error("Insufficient stock for {item_id}: {available} available, {requested} requested")]
    InsufficientStock {
        item_id: Uuid,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Stock item {0} is no longer tracked")]
    Inactive(Uuid),

    /// The per-item lock could not be taken in time, or the balance moved
    /// underneath a commit. Safe to retry with the same reference.
    #[error("Stock item busy: {0}")]
    Busy(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Busy(_))
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            AppError::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::Inactive(_) => "ITEM_INACTIVE",
            AppError::Busy(_) => "BUSY",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Attach the item id to a pure balance failure
    pub fn from_balance(item_id: Uuid, err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientStock {
                available,
                requested,
            } => AppError::InsufficientStock {
                item_id,
                available,
                requested,
            },
            BalanceError::InvalidQuantity {
                movement_type,
                quantity,
            } => AppError::InvalidQuantity {
                quantity,
                message: match movement_type {
                    shared::MovementType::In | shared::MovementType::Out => {
                        "Quantity must be positive".to_string()
                    }
                    _ => "Quantity must not be negative".to_string(),
                },
            },
        }
    }
}

impl From<FieldError> for AppError {
    fn from(err: FieldError) -> Self {
        AppError::Validation {
            field: err.field,
            message: err.message,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        FieldError::from(errors).into()
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub retryable: bool,
}

impl AppError {
    /// Body of the error response, for reporting failures inside batch results
    pub fn detail(&self) -> ErrorDetail {
        self.status_and_detail().1
    }

    fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        let detail = |message: String, field: Option<String>, details: Option<serde_json::Value>| {
            ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
                details,
                retryable: self.is_retryable(),
            }
        };

        match self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                detail(message.clone(), Some(field.clone()), None),
            ),
            AppError::InvalidQuantity { quantity, message } => (
                StatusCode::BAD_REQUEST,
                detail(
                    message.clone(),
                    Some("quantity".to_string()),
                    Some(json!({ "quantity": quantity })),
                ),
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                detail(
                    format!("A record with this {} already exists", field),
                    Some(field.clone()),
                    None,
                ),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                detail(format!("{} not found", resource), None, None),
            ),
            AppError::InsufficientStock {
                item_id,
                available,
                requested,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                detail(
                    format!(
                        "Only {} available, {} requested",
                        available, requested
                    ),
                    Some("quantity".to_string()),
                    Some(json!({
                        "stock_item_id": item_id,
                        "available": available,
                        "requested": requested,
                    })),
                ),
            ),
            AppError::Inactive(item_id) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                detail(
                    "Item is no longer tracked".to_string(),
                    None,
                    Some(json!({ "stock_item_id": item_id })),
                ),
            ),
            AppError::Busy(msg) => (
                StatusCode::CONFLICT,
                detail(format!("Stock item is busy, retry shortly: {}", msg), None, None),
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                detail(format!("Configuration error: {}", msg), None, None),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                detail("A database error occurred".to_string(), None, None),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                detail(msg.clone(), None, None),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                detail("An internal server error occurred".to_string(), None, None),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!(code = error_detail.code.as_str(), "Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for services and handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_carries_balances() {
        let item_id = Uuid::new_v4();
        let err = AppError::from_balance(
            item_id,
            BalanceError::InsufficientStock {
                available: Decimal::from(5),
                requested: Decimal::from(10),
            },
        );
        let (status, detail) = err.status_and_detail();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(detail.code, "INSUFFICIENT_STOCK");
        let details = detail.details.unwrap();
        assert_eq!(details["available"], json!("5"));
        assert_eq!(details["requested"], json!("10"));
    }

    #[test]
    fn test_only_busy_is_retryable() {
        assert!(AppError::Busy("lock".into()).is_retryable());
        assert!(!AppError::NotFound("Stock item".into()).is_retryable());
        assert!(!AppError::Inactive(Uuid::nil()).is_retryable());
    }

    #[test]
    fn test_field_error_maps_to_validation() {
        let err: AppError = FieldError::new("name", "Name must not be empty").into();
        let (status, detail) = err.status_and_detail();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(detail.field.as_deref(), Some("name"));
    }
}
