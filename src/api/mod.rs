use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::AppState;

pub mod access;
pub mod handlers;

/// Build the Management API router.
/// All routes are relative — the caller mounts this under `/api/v1`.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/links", post(handlers::create_link))
        .route("/stats", get(handlers::get_stats))
        .route("/logs", get(handlers::list_logs))
        .route("/sweep", post(handlers::run_sweep))
        .layer(middleware::from_fn_with_state(state, admin_auth))
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: validates `X-Admin-Key` (or a bearer token) against the
/// configured admin key. Returns 401 if missing/invalid, 500 if no admin
/// key is configured.
async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let provided_key = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    let Some(expected) = state.config.admin_key.as_deref() else {
        tracing::error!("PRIVLINK_ADMIN_KEY is not set; management API disabled");
        return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
    };

    match provided_key {
        Some(k) if bool::from(k.as_bytes().ct_eq(expected.as_bytes())) => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!("admin API: invalid key");
            Err(AppError::Unauthorized.into_response())
        }
        None => {
            tracing::warn!("admin API: missing X-Admin-Key header");
            Err(AppError::Unauthorized.into_response())
        }
    }
}
