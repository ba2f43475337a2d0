use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Stock update failed. Order cancelled.")]
    StockUpdateFailed,

    #[error("{0}")]
    Internal(String),
}

impl CheckoutError {
    /// Stable machine-readable name reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::EmptyCart => "empty_cart",
            Self::NotFound(_) => "not_found",
            Self::Unauthenticated(_) | Self::Forbidden(_) => "authorization_error",
            Self::StockUpdateFailed => "stock_update_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::EmptyCart => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::StockUpdateFailed | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(e: StoreError) -> Self { CheckoutError::Internal(e.to_string()) }
}

impl From<validator::ValidationErrors> for CheckoutError {
    fn from(e: validator::ValidationErrors) -> Self { CheckoutError::Validation(e.to_string()) }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        if let Self::Internal(message) = &self { tracing::error!(%message, "request failed"); }
        (self.status(), Json(json!({"success": false, "kind": self.kind(), "message": self.to_string()}))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
