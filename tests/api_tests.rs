//! HTTP API integration tests
//!
//! Drives the full router (middleware stack + `/api/v1` scope) against
//! stub providers and the in-process cache.

#[macro_use]
mod common;

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use serde_json::{Value, json};

use goip::cache::NullCacheStore;
use goip::ratelimit::{GovernorBackend, RateLimiter};

use common::{build_service, ipip_stub, maxmind_stub, memory_cache};

fn default_service() -> Arc<goip::services::LookupService> {
    build_service(
        vec![Arc::new(maxmind_stub()), Arc::new(ipip_stub())],
        memory_cache(),
    )
}

// =============================================================================
// Lookup
// =============================================================================

#[tokio::test]
async fn test_lookup_then_cache_hit() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::get().uri("/api/v1/ip/8.8.8.8").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("application/json")
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["ip"], "8.8.8.8");
    assert_eq!(body["country"]["iso_code"], "US");
    assert_eq!(body["provider"], "maxmind");
    assert_eq!(body["source"], "db");

    let req = TestRequest::get().uri("/api/v1/ip/8.8.8.8").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["source"], "cache");
    assert_eq!(body["provider"], "maxmind");
}

#[tokio::test]
async fn test_cn_lookup_is_served_by_ipip() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::get().uri("/api/v1/ip/114.114.114.114").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["provider"], "ipip");
    assert_eq!(body["country"]["iso_code"], "CN");
    assert_eq!(body["city"]["name_zh"], "江苏南京");
}

#[tokio::test]
async fn test_invalid_ip_returns_400() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::get().uri("/api/v1/ip/999.999.999.999").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "INVALID_IP");
    assert!(body["error"].is_string());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_unknown_ip_returns_404() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::get().uri("/api/v1/ip/203.0.113.9").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "IP_NOT_FOUND");
}

#[tokio::test]
async fn test_lookup_with_named_provider() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::get()
        .uri("/api/v1/ip/114.114.114.114/provider?provider=maxmind")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["provider"], "maxmind");
    assert_eq!(body["source"], "db");

    let req = TestRequest::get()
        .uri("/api/v1/ip/8.8.8.8/provider")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "INVALID_REQUEST");

    let req = TestRequest::get()
        .uri("/api/v1/ip/8.8.8.8/provider?provider=ipinfo")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "PROVIDER_NOT_FOUND");
}

// =============================================================================
// Batch
// =============================================================================

#[tokio::test]
async fn test_batch_counts_failures() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::post()
        .uri("/api/v1/ip/batch")
        .set_json(json!({ "ips": ["8.8.8.8", "1.1.1.1", "not-an-ip"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["success"], 2);
    assert_eq!(body["failed"], 1);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["ip"], "8.8.8.8");
    assert_eq!(results[1]["ip"], "1.1.1.1");
}

#[tokio::test]
async fn test_batch_too_large() {
    let app = init_app!(default_service(), None, 100);

    let ips: Vec<String> = (0..101).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();
    let req = TestRequest::post()
        .uri("/api/v1/ip/batch")
        .set_json(json!({ "ips": ips }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "BATCH_TOO_LARGE");
}

#[tokio::test]
async fn test_batch_rejects_empty_and_malformed_bodies() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::post()
        .uri("/api/v1/ip/batch")
        .set_json(json!({ "ips": [] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "INVALID_REQUEST");

    let req = TestRequest::post()
        .uri("/api/v1/ip/batch")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"ips\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "INVALID_REQUEST");
}

// =============================================================================
// Cache management
// =============================================================================

#[tokio::test]
async fn test_invalidate_then_lookup_hits_provider() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::get().uri("/api/v1/ip/8.8.8.8").to_request();
    test::call_service(&app, req).await;

    let req = TestRequest::post()
        .uri("/api/v1/cache/invalidate")
        .set_json(json!({ "ips": ["8.8.8.8", "1.2.3.4"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["deleted"], 1);

    let req = TestRequest::get().uri("/api/v1/ip/8.8.8.8").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["source"], "db");

    let req = TestRequest::post()
        .uri("/api/v1/cache/invalidate")
        .set_json(json!({ "ips": [] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cache_stats() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::get().uri("/api/v1/ip/8.8.8.8").to_request();
    test::call_service(&app, req).await;
    let req = TestRequest::get().uri("/api/v1/ip/8.8.8.8").to_request();
    test::call_service(&app, req).await;

    let req = TestRequest::get().uri("/api/v1/cache/stats").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["backend"], "memory");
    assert!(body["cache_hits"].as_u64().unwrap() >= 1);
}

// =============================================================================
// System endpoints
// =============================================================================

#[tokio::test]
async fn test_health_and_liveness() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["cache"], "healthy");
    assert_eq!(body["services"]["provider"], "healthy");

    for path in ["/healthz", "/health"] {
        let req = TestRequest::get().uri(path).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "OK");
    }
}

#[tokio::test]
async fn test_health_reports_disabled_cache() {
    let service = build_service(vec![Arc::new(maxmind_stub())], Arc::new(NullCacheStore));
    let app = init_app!(service, None, 100);

    let req = TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["services"]["cache"], "disabled");
}

#[tokio::test]
async fn test_providers_stats_and_info() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::get().uri("/api/v1/providers").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["providers"], json!(["maxmind", "ipip"]));
    assert_eq!(body["count"], 2);

    let req = TestRequest::get().uri("/api/v1/ip/8.8.8.8").to_request();
    test::call_service(&app, req).await;

    let req = TestRequest::get().uri("/api/v1/stats").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["total_queries"], 1);
    assert_eq!(body["cache_misses"], 1);
    assert_eq!(body["total_errors"], 0);

    let req = TestRequest::get().uri("/").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["service"], "goip");
    assert_eq!(body["status"], "running");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_request_id_header() {
    let app = init_app!(default_service(), None, 100);

    let req = TestRequest::get().uri("/healthz").to_request();
    let resp = test::call_service(&app, req).await;
    let generated = resp.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(generated.len(), 32);

    let req = TestRequest::get()
        .uri("/api/v1/ip/8.8.8.8")
        .insert_header(("X-Request-ID", "trace-abc-123"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "trace-abc-123");
}

// =============================================================================
// Rate limiting
// =============================================================================

fn limited_request(uri: &str) -> TestRequest {
    TestRequest::get()
        .uri(uri)
        .peer_addr("198.51.100.20:51000".parse().unwrap())
}

#[tokio::test]
async fn test_rate_limit_rejects_third_request() {
    let limiter = Arc::new(RateLimiter::new(
        Arc::new(GovernorBackend::new(2, 0)),
        2,
        0,
    ));
    let app = init_app!(default_service(), Some(limiter), 100);

    for _ in 0..2 {
        let resp = test::call_service(&app, limited_request("/api/v1/ip/8.8.8.8").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = test::call_service(&app, limited_request("/api/v1/ip/8.8.8.8").to_request()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = resp
        .headers()
        .get("Retry-After")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");

    // 存活探测不受限流影响
    let resp = test::call_service(&app, limited_request("/healthz").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
