//! 限流中间件
//!
//! 以客户端 IP 为 key 调用 [`RateLimiter`]，超限返回 429。
//! 未配置限流器时直接放行。

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::StatusCode,
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::api::services::helpers::error_body;
use crate::ratelimit::{RateLimitDecision, RateLimiter};
use crate::utils::ip::extract_client_ip;

/// 限流中间件工厂
#[derive(Clone, Default)]
pub struct RateLimitMiddleware {
    limiter: Option<Arc<RateLimiter>>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Option<Arc<RateLimiter>>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitService<S> {
    service: Rc<S>,
    limiter: Option<Arc<RateLimiter>>,
}

/// 构造 429 响应
pub fn too_many_requests(limit: u32, retry_after: u64) -> HttpResponse {
    HttpResponse::build(StatusCode::TOO_MANY_REQUESTS)
        .insert_header(("Retry-After", retry_after.to_string()))
        .insert_header(("X-RateLimit-Limit", limit.to_string()))
        .insert_header(("X-RateLimit-Remaining", "0"))
        .json(error_body("rate limit exceeded", "RATE_LIMIT_EXCEEDED"))
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();
        let Some(limiter) = self.limiter.clone() else {
            return Box::pin(async move {
                srv.call(req)
                    .await
                    .map(ServiceResponse::map_into_left_body)
            });
        };

        let client_ip = extract_client_ip(&req.connection_info(), req.headers())
            .unwrap_or_else(|| "unknown".to_string());

        Box::pin(async move {
            match limiter.check(&client_ip).await {
                RateLimitDecision::Allowed => srv
                    .call(req)
                    .await
                    .map(ServiceResponse::map_into_left_body),
                RateLimitDecision::Limited {
                    limit, retry_after, ..
                } => Ok(req.into_response(
                    too_many_requests(limit, retry_after).map_into_right_body(),
                )),
            }
        })
    }
}
