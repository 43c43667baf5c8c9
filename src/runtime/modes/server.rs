//! Server mode
//!
//! This module contains the HTTP server startup logic.
//! It wires the lookup service into actix-web and handles graceful shutdown.

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api;
use crate::api::middleware::{AccessLogMiddleware, RecoveryMiddleware, RequestIdMiddleware};
use crate::api::services::AppStartTime;
use crate::config::StaticConfig;
use crate::runtime::lifetime;

/// Run the HTTP server
///
/// This function:
/// 1. Prepares server components (providers, cache, rate limiter)
/// 2. Configures and starts the HTTP server
/// 3. Waits for Ctrl+C / SIGTERM, drains in-flight requests, then closes
///    providers and cache connections
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server(config: &StaticConfig) -> Result<()> {
    let app_start_time = AppStartTime::default();

    let startup = lifetime::startup::prepare_server_startup(config)
        .await
        .inspect_err(|e| tracing::error!("Server startup failed: {:#}", e))?;

    let service = web::Data::from(startup.service.clone());
    let batch = web::Data::new(config.batch.clone());
    let rate_limiter = startup.rate_limiter.clone();

    let workers = config.server.workers.clamp(1, 64);
    let shutdown_timeout = config.server.shutdown_timeout;
    let bind_address = format!("{}:{}", config.server.host, config.server.port);

    let server = HttpServer::new(move || {
        let rate_limiter = rate_limiter.clone();
        App::new()
            .wrap(RecoveryMiddleware) // 最内层，捕获 handler panic
            .wrap(AccessLogMiddleware)
            .wrap(RequestIdMiddleware) // 最外层，所有响应都带 X-Request-ID
            .app_data(service.clone())
            .app_data(batch.clone())
            .app_data(web::Data::new(app_start_time.clone()))
            .app_data(web::PayloadConfig::new(1024 * 1024))
            .configure(|cfg| api::configure(cfg, rate_limiter))
    })
    .workers(workers)
    .client_request_timeout(config.server.read_timeout)
    .keep_alive(config.server.write_timeout)
    .shutdown_timeout(shutdown_timeout.as_secs())
    .disable_signals()
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run();

    warn!(
        "Starting server at http://{} with {} workers",
        bind_address, workers
    );

    let handle = server.handle();
    let mut server = std::pin::pin!(server);

    // Wait for server or shutdown signal
    tokio::select! {
        res = &mut server => {
            res?;
        }
        _ = lifetime::shutdown::wait_for_signal() => {
            info!("Stopping HTTP server, draining in-flight requests...");
            handle.stop(true).await;
        }
    }

    lifetime::shutdown::close_resources(
        &startup.service,
        startup.redis_pool.clone(),
        shutdown_timeout,
    )
    .await;
    warn!("Graceful shutdown: all tasks completed");

    Ok(())
}
