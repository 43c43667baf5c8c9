//! 缓存管理接口

use actix_web::http::StatusCode;
use actix_web::{Responder, web};
use serde::Serialize;
use tracing::{error, info};

use crate::models::BatchRequest;
use crate::services::LookupService;

use super::helpers::{error_response, json_response};

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    /// 请求清除的 IP 数
    pub count: usize,
    /// 实际删除的缓存条目数
    pub deleted: u64,
}

/// GET /api/v1/cache/stats
pub async fn cache_stats(service: web::Data<LookupService>) -> impl Responder {
    match service.cache().stats().await {
        Ok(stats) => json_response(StatusCode::OK, &stats),
        Err(e) => {
            error!("Failed to collect cache stats: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CACHE_ERROR",
                e.message(),
            )
        }
    }
}

/// POST /api/v1/cache/invalidate
pub async fn invalidate_cache(
    body: web::Json<BatchRequest>,
    service: web::Data<LookupService>,
) -> impl Responder {
    let ips = body.into_inner().ips;
    if ips.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "ips must contain at least one IP address",
        );
    }

    match service.invalidate(&ips).await {
        Ok(deleted) => {
            info!("Cache invalidated for {} IPs", ips.len());
            json_response(
                StatusCode::OK,
                &InvalidateResponse {
                    message: "cache invalidated".to_string(),
                    count: ips.len(),
                    deleted,
                },
            )
        }
        Err(e) => {
            error!("Cache invalidation failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CACHE_ERROR",
                e.message(),
            )
        }
    }
}

pub fn cache_routes() -> actix_web::Scope {
    web::scope("/cache")
        .route("/stats", web::get().to(cache_stats))
        .route("/invalidate", web::post().to(invalidate_cache))
}
