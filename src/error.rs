use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::PaymentStatus,
    response::ApiResponse,
    store::StoreError,
};

/// Why a lookup failed: the record is missing, or the store could not answer.
#[derive(Debug, Error)]
pub enum Lookup {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Store(String),
}

impl From<StoreError> for Lookup {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Lookup::NotFound,
            other => Lookup::Store(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("customer ID not found")]
    CustomerIdNotFound,

    #[error("cart is empty")]
    CartEmpty,

    #[error("failed to retrieve cart: {0}")]
    CartRetrievalFailed(Lookup),

    #[error("failed to retrieve order: {0}")]
    OrderRetrievalFailed(Lookup),

    #[error("failed to retrieve transaction: {0}")]
    TransactionRetrievalFailed(Lookup),

    #[error("product {0} not found")]
    ProductNotFound(Uuid),

    #[error("failed to retrieve product {0}: {1}")]
    ProductRetrievalFailed(Uuid, String),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    StockUnavailable {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("invalid payment status: {0}")]
    InvalidPaymentStatus(String),

    #[error("order {order_id} is not awaiting payment (payment status: {status})")]
    OrderNotPending {
        order_id: Uuid,
        status: PaymentStatus,
    },

    #[error("failed to {action}: {reason}")]
    PersistenceFailed { action: &'static str, reason: String },

    #[error("request cancelled before completion")]
    Cancelled,

    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized {0}")]
    Unauthorized(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Builds a `map_err` adapter that wraps a store failure with the action
    /// that was being attempted.
    pub fn persistence(action: &'static str) -> impl FnOnce(StoreError) -> AppError {
        move |err| AppError::PersistenceFailed {
            action,
            reason: err.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::CustomerIdNotFound | AppError::CartEmpty | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::CartRetrievalFailed(lookup)
            | AppError::OrderRetrievalFailed(lookup)
            | AppError::TransactionRetrievalFailed(lookup) => match lookup {
                Lookup::NotFound => StatusCode::NOT_FOUND,
                Lookup::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::ProductNotFound(_) | AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::StockUnavailable { .. } | AppError::OrderNotPending { .. } => {
                StatusCode::CONFLICT
            }
            AppError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            AppError::ProductRetrievalFailed(..)
            | AppError::InvalidPaymentStatus(_)
            | AppError::PersistenceFailed { .. }
            | AppError::DbError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let body = ApiResponse::failure(
            status.canonical_reason().unwrap_or("Error"),
            ErrorData {
                error: self.to_string(),
            },
        );

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
