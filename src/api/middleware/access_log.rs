//! Access log middleware
//!
//! Logs one line per request and one per response. The level follows the
//! response status; health check endpoints are skipped.

use actix_service::{Service, Transform};
use actix_web::{
    Error,
    dev::{ServiceRequest, ServiceResponse},
    http::StatusCode,
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::utils::ip::extract_client_ip;

/// Paths that never produce access log lines
const SILENT_PATHS: &[&str] = &["/healthz", "/health"];

/// Lookup details a handler attaches to its response for the access log
#[derive(Clone, Debug)]
pub struct LookupOutcome {
    pub provider: String,
    pub source: String,
}

/// Access log middleware factory
#[derive(Clone, Default)]
pub struct AccessLogMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AccessLogMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AccessLogService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessLogService {
            service: Rc::new(service),
        }))
    }
}

pub struct AccessLogService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AccessLogService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
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

        if SILENT_PATHS.contains(&req.path()) {
            return Box::pin(srv.call(req));
        }

        let start = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let client_ip = extract_client_ip(&req.connection_info(), req.headers())
            .unwrap_or_else(|| "unknown".to_string());
        let user_agent = req
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        debug!(
            "--> {} {} from {} ({})",
            method, path, client_ip, user_agent
        );

        Box::pin(async move {
            let result = srv.call(req).await;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            match &result {
                Ok(response) => {
                    let status = response.status();
                    let outcome = response
                        .response()
                        .extensions()
                        .get::<LookupOutcome>()
                        .cloned();
                    let (provider, source) = match &outcome {
                        Some(o) => (o.provider.as_str(), o.source.as_str()),
                        None => ("-", "-"),
                    };
                    log_response(
                        status,
                        &method,
                        &path,
                        &client_ip,
                        latency_ms,
                        provider,
                        source,
                    );
                }
                Err(e) => {
                    error!(
                        "<-- {} {} failed after {:.2}ms from {}: {}",
                        method, path, latency_ms, client_ip, e
                    );
                }
            }

            result
        })
    }
}

fn log_response(
    status: StatusCode,
    method: &str,
    path: &str,
    client_ip: &str,
    latency_ms: f64,
    provider: &str,
    source: &str,
) {
    let status = status.as_u16();
    if status >= 500 {
        error!(
            status,
            latency_ms, client_ip, provider, source, "<-- {} {}", method, path
        );
    } else if status >= 400 {
        warn!(
            status,
            latency_ms, client_ip, provider, source, "<-- {} {}", method, path
        );
    } else {
        info!(
            status,
            latency_ms, client_ip, provider, source, "<-- {} {}", method, path
        );
    }
}
