use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{error, info, trace};

use crate::services::LookupService;

use super::helpers::json_response;

/// 依赖检查的超时时间
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const HEALTHY: &str = "healthy";

// 应用启动时间结构体
#[derive(Clone, Debug)]
pub struct AppStartTime {
    pub start_datetime: chrono::DateTime<chrono::Utc>,
}

impl Default for AppStartTime {
    fn default() -> Self {
        Self {
            start_datetime: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub services: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub status: String,
    pub uptime: u64,
}

/// Health Service
///
/// `/api/v1/health` 检查缓存与 provider，`/healthz` 只做存活探测。
pub struct HealthService;

impl HealthService {
    pub async fn health_check(service: web::Data<LookupService>) -> impl Responder {
        let start_time = Instant::now();
        trace!("Received health check request");

        let mut services = BTreeMap::new();

        // 缓存
        let cache = service.cache();
        let cache_status = if !cache.is_enabled() {
            "disabled".to_string()
        } else {
            match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, cache.health_check()).await {
                Ok(Ok(())) => HEALTHY.to_string(),
                Ok(Err(e)) => {
                    error!("Cache health check failed: {}", e);
                    format!("unhealthy: {}", e.message())
                }
                Err(_) => {
                    error!("Cache health check timeout");
                    "unhealthy: timeout".to_string()
                }
            }
        };
        services.insert("cache".to_string(), cache_status);

        // provider
        let provider_status =
            match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, service.resolver().health()).await {
                Ok(reports) => {
                    let failures: Vec<String> = reports
                        .iter()
                        .filter(|r| !r.healthy)
                        .map(|r| {
                            format!("{}: {}", r.kind, r.error.as_deref().unwrap_or("unknown"))
                        })
                        .collect();
                    if failures.is_empty() {
                        HEALTHY.to_string()
                    } else {
                        error!("Provider health check failed: {}", failures.join("; "));
                        format!("unhealthy: {}", failures.join("; "))
                    }
                }
                Err(_) => {
                    error!("Provider health check timeout");
                    "unhealthy: timeout".to_string()
                }
            };
        services.insert("provider".to_string(), provider_status);

        let is_healthy = services
            .values()
            .all(|status| status == HEALTHY || status == "disabled");

        info!(
            "Health check completed in {:?}, status: {}",
            start_time.elapsed(),
            if is_healthy { "healthy" } else { "unhealthy" }
        );

        let status = if is_healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        json_response(
            status,
            &HealthResponse {
                status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
                services,
            },
        )
    }

    /// 存活探测，不访问任何依赖
    pub async fn liveness_check() -> impl Responder {
        HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body("OK")
    }

    pub async fn stats(service: web::Data<LookupService>) -> impl Responder {
        json_response(StatusCode::OK, &service.stats())
    }

    pub async fn providers(service: web::Data<LookupService>) -> impl Responder {
        let providers = service.available_providers();
        json_response(
            StatusCode::OK,
            &ProvidersResponse {
                count: providers.len(),
                providers,
            },
        )
    }

    pub async fn service_info(app_start_time: web::Data<AppStartTime>) -> impl Responder {
        let uptime = (chrono::Utc::now() - app_start_time.start_datetime)
            .num_seconds()
            .max(0) as u64;
        json_response(
            StatusCode::OK,
            &ServiceInfo {
                service: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                status: "running".to_string(),
                uptime,
            },
        )
    }
}
