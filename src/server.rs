use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::api;
use crate::AppState;

/// Full HTTP surface: access entry point, health, metrics, management API.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::access::access_handler))
        // Health endpoints (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        // Management API — nested under /api/v1
        .nest("/api/v1", api::api_router(state.clone()))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware))
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.service.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!("readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
    }
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        state.metrics.encode(),
    )
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with server logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    // Redirect responses must never be cached: a cached 302 would replay a
    // single-use grant without touching the store.
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    // Access URLs carry the token in the query string
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));

    headers.remove(header::SERVER);

    resp
}
