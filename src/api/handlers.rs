use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::access_log::{AuditPage, AuditView};
use crate::models::token::{IssuedToken, UsageMode};
use crate::AppState;

/// Log viewer page size when none is requested.
pub const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_TTL_HOURS: i64 = 24;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct CreateLinkRequest {
    pub destination_url: String,
    #[serde(default)]
    pub usage_mode: UsageMode,
    pub ttl_hours: Option<i64>,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
}

#[derive(Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Serialize, Deserialize)]
pub struct SweepResponse {
    pub deleted: u64,
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /api/v1/links — issue a new access token
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<IssuedToken>), AppError> {
    let issued = state
        .service
        .issue(
            &payload.destination_url,
            payload.usage_mode,
            payload.ttl_hours.unwrap_or(DEFAULT_TTL_HOURS),
        )
        .await
        .map_err(|e| {
            if let AppError::Validation(reason) = &e {
                tracing::warn!("create_link: {}", reason);
            }
            e
        })?;

    Ok((StatusCode::CREATED, Json(issued)))
}

/// GET /api/v1/stats — total and currently valid token counts
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.service.stats().await?;
    Ok(Json(StatsResponse {
        total: stats.total,
        active: stats.active,
        inactive: stats.inactive(),
    }))
}

/// GET /api/v1/logs — access log, newest first
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<AuditPage>, AppError> {
    let (page, per_page) = normalize_page(params.page, params.per_page);
    let offset = (page - 1) * per_page;

    let total = state.access_log.count().await?;
    let rows = state.access_log.list(per_page, offset).await?;

    Ok(Json(AuditPage {
        entries: rows.into_iter().map(AuditView::from).collect(),
        page,
        per_page,
        total,
        total_pages: total_pages(total, per_page),
    }))
}

/// POST /api/v1/sweep — run the expiry reclaimer now
pub async fn run_sweep(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, AppError> {
    let deleted = state.service.sweep().await?;
    tracing::info!(rows = deleted, "manual sweep");
    Ok(Json(SweepResponse { deleted }))
}

/// Highest page number whose offset still fits in an `i64`.
const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

/// 1-based page clamped to 1..=MAX_PAGE, page size clamped to 1..=100.
pub fn normalize_page(page: Option<i64>, per_page: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
    let per_page = per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, per_page)
}

fn total_pages(total: i64, per_page: i64) -> i64 {
    (total + per_page - 1) / per_page
}
