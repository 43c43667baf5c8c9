//! IP 查询接口

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::BatchConfig;
use crate::models::BatchRequest;
use crate::services::LookupService;

use super::helpers::{error_from_goip, error_response, json_response, record_response};

#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub provider: Option<String>,
}

/// GET /api/v1/ip/{ip}
pub async fn lookup_ip(
    path: web::Path<String>,
    service: web::Data<LookupService>,
) -> impl Responder {
    let ip = path.into_inner();
    trace!("Lookup request for {}", ip);

    match service.lookup(&ip).await {
        Ok(record) => record_response(&record),
        Err(e) => {
            debug!("Lookup for {} failed: {}", ip, e);
            error_from_goip(&e)
        }
    }
}

/// GET /api/v1/ip/{ip}/provider?provider=<kind>
pub async fn lookup_ip_with_provider(
    path: web::Path<String>,
    query: web::Query<ProviderQuery>,
    service: web::Data<LookupService>,
) -> impl Responder {
    let ip = path.into_inner();
    let Some(provider) = query
        .into_inner()
        .provider
        .filter(|p| !p.trim().is_empty())
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "provider parameter is required",
        );
    };

    match service.lookup_with(&ip, provider.trim()).await {
        Ok(record) => record_response(&record),
        Err(e) => {
            debug!("Lookup for {} via {} failed: {}", ip, provider, e);
            error_from_goip(&e)
        }
    }
}

/// POST /api/v1/ip/batch
pub async fn batch_lookup(
    body: web::Json<BatchRequest>,
    service: web::Data<LookupService>,
    batch: web::Data<BatchConfig>,
) -> impl Responder {
    let ips = body.into_inner().ips;

    if ips.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "ips must contain at least one IP address",
        );
    }
    if ips.len() > batch.max_size {
        return error_response(
            StatusCode::BAD_REQUEST,
            "BATCH_TOO_LARGE",
            &format!(
                "batch size {} exceeds the limit of {} IP addresses",
                ips.len(),
                batch.max_size
            ),
        );
    }

    match service.batch(&ips).await {
        Ok(result) => json_response(StatusCode::OK, &result),
        Err(e) => error_from_goip(&e),
    }
}

/// 请求体无法解析时返回 INVALID_REQUEST
pub fn json_error_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        actix_web::error::InternalError::from_response(
            err,
            error_response(StatusCode::BAD_REQUEST, "INVALID_REQUEST", &message),
        )
        .into()
    })
}

pub fn lookup_routes() -> actix_web::Scope {
    web::scope("/ip")
        // /batch 必须在 /{ip} 之前注册
        .route("/batch", web::post().to(batch_lookup))
        .route("/{ip}/provider", web::get().to(lookup_ip_with_provider))
        .route("/{ip}", web::get().to(lookup_ip))
}
