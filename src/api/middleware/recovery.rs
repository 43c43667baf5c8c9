//! Panic recovery middleware
//!
//! handler 中的 panic 在请求边界被捕获并转换为 500 `PANIC_RECOVERED`，
//! worker 线程继续服务。调用栈由 panic hook 记录。

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::StatusCode,
};
use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use tracing::error;

use super::request_id::RequestId;
use crate::api::services::helpers::error_body;

pub const PANIC_RECOVERED: &str = "PANIC_RECOVERED";

/// Panic recovery 中间件工厂
#[derive(Clone, Default)]
pub struct RecoveryMiddleware;

impl<S, B> Transform<S, ServiceRequest> for RecoveryMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RecoveryService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RecoveryService {
            service: Rc::new(service),
        }))
    }
}

pub struct RecoveryService<S> {
    service: Rc<S>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl<S, B> Service<ServiceRequest> for RecoveryService<S>
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
        // panic 后原请求已被消耗，保留一份 HttpRequest 用于构造响应
        let http_req = req.request().clone();
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default();

        Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { srv.call(req).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(result) => result.map(ServiceResponse::map_into_left_body),
                Err(payload) => {
                    error!(
                        "Panic recovered while handling {} {} (request_id={}): {}",
                        http_req.method(),
                        http_req.path(),
                        request_id,
                        panic_message(payload.as_ref())
                    );
                    let response = HttpResponse::build(StatusCode::INTERNAL_SERVER_ERROR)
                        .json(error_body("internal server error", PANIC_RECOVERED))
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}
