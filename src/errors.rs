use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the token service and its HTTP front.
///
/// Token validation outcomes (`NotFound`, `Expired`, `AlreadyConsumed`) are
/// not errors; they are `models::token::Outcome` values.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Validation(reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_failed",
                reason.clone(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_admin_key",
                "invalid or missing admin key".to_string(),
            ),
            AppError::StoreUnavailable(e) => {
                tracing::error!("Store error: {:#}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "internal_error",
                    "store_unavailable",
                    "service temporarily unavailable".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
