//! HTTP surface
//!
//! - `/api/v1/*`: lookup, batch, cache and system endpoints (rate limited)
//! - `/healthz`, `/health`: liveness checks
//! - `/`: service info

pub mod middleware;
pub mod services;

use std::sync::Arc;

use actix_web::web;

use crate::ratelimit::RateLimiter;
use middleware::RateLimitMiddleware;
use services::{HealthService, cache_routes, json_error_config, lookup_routes};

pub const API_V1_PREFIX: &str = "/api/v1";

/// 注册全部路由
///
/// 调用方负责注入 `LookupService`、`BatchConfig`、`AppStartTime` 三个 app data。
pub fn configure(cfg: &mut web::ServiceConfig, rate_limiter: Option<Arc<RateLimiter>>) {
    cfg.service(
        web::scope(API_V1_PREFIX)
            .wrap(RateLimitMiddleware::new(rate_limiter))
            .app_data(json_error_config())
            .service(lookup_routes())
            .service(cache_routes())
            .route("/providers", web::get().to(HealthService::providers))
            .route("/health", web::get().to(HealthService::health_check))
            .route("/stats", web::get().to(HealthService::stats)),
    )
    .route("/healthz", web::get().to(HealthService::liveness_check))
    .route("/health", web::get().to(HealthService::liveness_check))
    .route("/", web::get().to(HealthService::service_info));
}
