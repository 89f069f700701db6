//! HTTP surface tests: the access entry point and the management API,
//! driven through the axum router with the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use privlink::clock::ManualClock;
use privlink::config::{Config, StoreBackend};
use privlink::models::token::{NewToken, Token, TokenStats};
use privlink::server;
use privlink::store::memory::MemoryStore;
use privlink::store::TokenStore;
use privlink::AppState;

const ADMIN_KEY: &str = "test-admin-key";
const DENIAL: &str = "https://links.example.com/";

struct Harness {
    app: Router,
    clock: Arc<ManualClock>,
}

fn config(admin_key: Option<&str>) -> Config {
    Config {
        port: 0,
        database_url: String::new(),
        store: StoreBackend::Memory,
        base_url: "https://links.example.com".into(),
        denial_url: None,
        admin_key: admin_key.map(String::from),
        sweep_interval_secs: 86_400,
    }
}

fn harness_with(admin_key: Option<&str>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
    ));
    let state = AppState::new(config(admin_key), store.clone(), store, clock.clone()).unwrap();
    Harness {
        app: server::router(Arc::new(state)),
        clock,
    }
}

fn harness() -> Harness {
    harness_with(Some(ADMIN_KEY))
}

async fn send(app: &Router, req: Request<Body>) -> axum::response::Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn admin(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-admin-key", ADMIN_KEY);
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn access(token: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/?access=true&token={}", token))
        .header(header::USER_AGENT, "integration-test")
        .body(Body::empty())
        .unwrap()
}

fn location(resp: &axum::response::Response) -> &str {
    resp.headers()[header::LOCATION].to_str().unwrap()
}

async fn create_link(app: &Router, url: &str, mode: &str, ttl: i64) -> Value {
    let resp = send(
        app,
        admin(
            "POST",
            "/api/v1/links",
            Some(json!({"destination_url": url, "usage_mode": mode, "ttl_hours": ttl})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    json_body(resp).await
}

// ── Access entry point ───────────────────────────────────────

#[tokio::test]
async fn test_single_use_link_redirects_once() {
    let h = harness();
    let link = create_link(&h.app, "https://ex.com/doc", "single", 1).await;
    let token = link["token"].as_str().unwrap();
    assert_eq!(
        link["access_url"],
        format!("https://links.example.com/?access=true&token={}", token)
    );

    let first = send(&h.app, access(token)).await;
    assert_eq!(first.status(), StatusCode::FOUND);
    assert_eq!(location(&first), "https://ex.com/doc");

    let second = send(&h.app, access(token)).await;
    assert_eq!(second.status(), StatusCode::FOUND);
    assert_eq!(location(&second), DENIAL);
}

#[tokio::test]
async fn test_denials_are_indistinguishable() {
    let h = harness();
    let used = create_link(&h.app, "https://ex.com/a", "single", 1).await;
    let used = used["token"].as_str().unwrap().to_string();
    let expiring = create_link(&h.app, "https://ex.com/b", "multiple", 1).await;
    let expiring = expiring["token"].as_str().unwrap().to_string();

    send(&h.app, access(&used)).await;
    h.clock.advance(Duration::minutes(61));

    let mut denials = Vec::new();
    for token in [used.as_str(), expiring.as_str(), "00000000000000000000000000000000", ""] {
        let resp = send(&h.app, access(token)).await;
        denials.push((resp.status(), location(&resp).to_string()));
    }
    assert!(denials
        .iter()
        .all(|d| *d == (StatusCode::FOUND, DENIAL.to_string())));

    // Operators still see the real reasons.
    let logs = json_body(send(&h.app, admin("GET", "/api/v1/logs", None)).await).await;
    let outcomes: Vec<&str> = logs["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["outcome"].as_str().unwrap())
        .collect();
    assert_eq!(
        outcomes,
        vec!["not_found", "not_found", "expired", "expired", "granted"]
    );
}

#[tokio::test]
async fn test_root_without_access_flag_is_landing_page() {
    let h = harness();
    let resp = send(
        &h.app,
        Request::builder().uri("/").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_redirect_carries_security_headers() {
    let h = harness();
    let resp = send(&h.app, access("deadbeef")).await;
    assert_eq!(resp.headers()[header::REFERRER_POLICY], "no-referrer");
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_repeated_token_param_is_denied_and_logged() {
    let h = harness();
    let link = create_link(&h.app, "https://ex.com/doc", "single", 1).await;
    let token = link["token"].as_str().unwrap();

    let resp = send(
        &h.app,
        Request::builder()
            .uri(format!("/?access=true&token={}&token={}", token, token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), DENIAL);

    let logs = json_body(send(&h.app, admin("GET", "/api/v1/logs", None)).await).await;
    assert_eq!(logs["total"], 1);
    assert_eq!(logs["entries"][0]["outcome"], "not_found");

    // The ambiguous request did not burn the single use.
    let resp = send(&h.app, access(token)).await;
    assert_eq!(location(&resp), "https://ex.com/doc");
}

#[tokio::test]
async fn test_odd_query_strings_take_the_denial_path() {
    let h = harness();
    for uri in [
        "/?access=true&token=%00",
        "/?access=true&token=%FF%FE",
        "/?access&token",
        "/?access=1&&&=&token=x&utm=1",
    ] {
        let resp = send(&h.app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::FOUND, "{}", uri);
        assert_eq!(location(&resp), DENIAL, "{}", uri);
    }

    let logs = json_body(send(&h.app, admin("GET", "/api/v1/logs", None)).await).await;
    assert_eq!(logs["total"], 4);
}

// ── Management API ───────────────────────────────────────────

#[tokio::test]
async fn test_admin_api_requires_key() {
    let h = harness();

    let missing = send(
        &h.app,
        Request::builder()
            .uri("/api/v1/stats")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let err = json_body(missing).await;
    assert_eq!(err["error"]["code"], "invalid_admin_key");

    let wrong = send(
        &h.app,
        Request::builder()
            .uri("/api/v1/stats")
            .header("x-admin-key", "not-the-key")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let bearer = send(
        &h.app,
        Request::builder()
            .uri("/api/v1/stats")
            .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_KEY))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(bearer.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_api_disabled_without_configured_key() {
    let h = harness_with(None);
    let resp = send(&h.app, admin("GET", "/api/v1/stats", None)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_create_link_validation() {
    let h = harness();
    for body in [
        json!({"destination_url": "not a url"}),
        json!({"destination_url": "ftp://ex.com/file"}),
        json!({"destination_url": "https://ex.com", "ttl_hours": 0}),
        json!({"destination_url": "https://ex.com", "ttl_hours": -1}),
    ] {
        let resp = send(&h.app, admin("POST", "/api/v1/links", Some(body.clone()))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        let err = json_body(resp).await;
        assert_eq!(err["error"]["code"], "validation_failed");
    }
}

#[tokio::test]
async fn test_create_link_defaults_to_single_24h() {
    let h = harness();
    let resp = send(
        &h.app,
        admin(
            "POST",
            "/api/v1/links",
            Some(json!({"destination_url": "https://ex.com/doc"})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let link = json_body(resp).await;
    assert_eq!(link["usage_mode"], "single");
    assert_eq!(link["expiration"], "2025-03-02T12:00:00Z");
}

#[tokio::test]
async fn test_stats_endpoint() {
    let h = harness();
    let single = create_link(&h.app, "https://ex.com/a", "single", 1).await;
    create_link(&h.app, "https://ex.com/b", "multiple", 48).await;
    send(&h.app, access(single["token"].as_str().unwrap())).await;

    let stats = json_body(send(&h.app, admin("GET", "/api/v1/stats", None)).await).await;
    assert_eq!(stats, json!({"total": 2, "active": 1, "inactive": 1}));
}

#[tokio::test]
async fn test_logs_are_paginated_newest_first() {
    let h = harness();
    let link = create_link(&h.app, "https://ex.com/doc", "multiple", 24).await;
    let token = link["token"].as_str().unwrap();

    for _ in 0..25 {
        send(&h.app, access(token)).await;
        h.clock.advance(Duration::seconds(1));
    }

    let page1 = json_body(send(&h.app, admin("GET", "/api/v1/logs", None)).await).await;
    assert_eq!(page1["per_page"], 20);
    assert_eq!(page1["total"], 25);
    assert_eq!(page1["total_pages"], 2);
    let entries = page1["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 20);
    assert_eq!(entries[0]["token_prefix"], format!("{}...", &token[..8]));
    assert_eq!(entries[0]["destination_url"], "https://ex.com/doc");
    assert_eq!(entries[0]["accessed_at"], "2025-03-01T12:00:24Z");

    let page2 = json_body(send(&h.app, admin("GET", "/api/v1/logs?page=2", None)).await).await;
    let entries = page2["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[4]["accessed_at"], "2025-03-01T12:00:00Z");
}

#[tokio::test]
async fn test_logs_page_far_past_the_end_is_empty() {
    let h = harness();
    send(&h.app, access("unknown")).await;

    let resp = send(
        &h.app,
        admin(
            "GET",
            "/api/v1/logs?page=9223372036854775807&per_page=100",
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = json_body(resp).await;
    assert_eq!(page["total"], 1);
    assert!(page["entries"].as_array().unwrap().is_empty());
    assert_eq!(page["page"], i64::MAX / 100);
}

#[tokio::test]
async fn test_sweep_endpoint_keeps_access_log() {
    let h = harness();
    let link = create_link(&h.app, "https://ex.com/doc", "single", 1).await;
    send(&h.app, access(link["token"].as_str().unwrap())).await;

    h.clock.advance(Duration::hours(2));
    let swept = json_body(send(&h.app, admin("POST", "/api/v1/sweep", None)).await).await;
    assert_eq!(swept["deleted"], 1);

    let again = json_body(send(&h.app, admin("POST", "/api/v1/sweep", None)).await).await;
    assert_eq!(again["deleted"], 0);

    let logs = json_body(send(&h.app, admin("GET", "/api/v1/logs", None)).await).await;
    assert_eq!(logs["total"], 1);
    assert!(logs["entries"][0]["destination_url"].is_null());
}

// ── Store failures ───────────────────────────────────────────

/// Token store whose backend is unreachable.
struct UnreachableStore;

#[async_trait]
impl TokenStore for UnreachableStore {
    async fn insert(&self, _token: &NewToken) -> anyhow::Result<Option<Token>> {
        anyhow::bail!("connection refused")
    }

    async fn find(&self, _token: &str) -> anyhow::Result<Option<Token>> {
        anyhow::bail!("connection refused")
    }

    async fn consume_if_unused(
        &self,
        _token: &str,
        _now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Token>> {
        anyhow::bail!("connection refused")
    }

    async fn delete_expired(&self, _now: DateTime<Utc>) -> anyhow::Result<u64> {
        anyhow::bail!("connection refused")
    }

    async fn stats(&self, _now: DateTime<Utc>) -> anyhow::Result<TokenStats> {
        anyhow::bail!("connection refused")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }
}

#[tokio::test]
async fn test_unreachable_store_fails_closed() {
    let log = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
    ));
    let state = AppState::new(config(Some(ADMIN_KEY)), Arc::new(UnreachableStore), log, clock).unwrap();
    let app = server::router(Arc::new(state));

    let resp = send(&app, access("0123456789abcdef0123456789abcdef")).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(resp.headers().get(header::LOCATION).is_none());
    let err = json_body(resp).await;
    assert_eq!(err["error"]["code"], "store_unavailable");

    let resp = send(&app, Request::builder().uri("/readyz").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let resp = send(&app, admin("GET", "/api/v1/stats", None)).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ── Health & metrics ─────────────────────────────────────────

#[tokio::test]
async fn test_health_and_metrics() {
    let h = harness();
    for uri in ["/healthz", "/readyz"] {
        let resp = send(&h.app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
    }

    send(&h.app, access("unknown")).await;
    let resp = send(
        &h.app,
        Request::builder().uri("/metrics").body(Body::empty()).unwrap(),
    )
    .await;
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("privlink_access_total{outcome=\"not_found\"} 1"));
}
