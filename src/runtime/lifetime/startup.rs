use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cache::{self, CacheStore, RedisPool};
use crate::config::StaticConfig;
use crate::ratelimit::RateLimiter;
use crate::services::geoip::build_provider;
use crate::services::{LookupService, MultiProviderResolver, ProviderEntry};

/// 启动时清空 `goip:*` 的环境变量
pub const FLUSH_ENV: &str = "FLUSH_DNS";

pub struct StartupContext {
    pub service: Arc<LookupService>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub redis_pool: Option<Arc<RedisPool>>,
}

/// 是否有组件使用 Redis
fn needs_redis(config: &StaticConfig) -> bool {
    (config.cache.enabled && config.cache.backend == "redis")
        || (config.rate_limit.enabled && config.rate_limit.storage == "redis")
}

/// 按配置顺序创建 provider，任一失败即中止启动
pub fn build_resolver(config: &StaticConfig) -> Result<MultiProviderResolver> {
    let mut entries = Vec::new();
    for provider_config in config.effective_providers() {
        let provider = build_provider(&provider_config, &config.external_api).with_context(
            || format!("Failed to initialize {} provider", provider_config.kind),
        )?;
        entries.push(ProviderEntry::new(
            provider,
            provider_config.priority,
            provider_config.region,
        ));
    }
    let resolver = MultiProviderResolver::new(entries).context("Failed to build resolver")?;
    info!("Resolver ready with providers: {:?}", resolver.list_kinds());
    Ok(resolver)
}

/// 准备服务器启动的上下文
/// 包括 provider、Redis 连接池、缓存、查询服务和限流器
pub async fn prepare_server_startup(config: &StaticConfig) -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let resolver = Arc::new(build_resolver(config)?);

    let redis_pool = if needs_redis(config) {
        let pool = Arc::new(RedisPool::new(&config.redis).context("Failed to create Redis pool")?);
        if pool.warm_up().await == 0 {
            warn!(
                "Redis at {}:{} is not reachable yet; cache and rate limiting will degrade until it is",
                config.redis.host, config.redis.port
            );
        }
        Some(pool)
    } else {
        None
    };

    let cache = cache::create_cache_store(&config.cache, redis_pool.clone())
        .context("Failed to create cache")?;

    if std::env::var(FLUSH_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("true")) {
        flush_cache(cache.as_ref()).await;
    }

    let service = Arc::new(LookupService::new(resolver, cache));

    let rate_limiter = RateLimiter::from_config(&config.rate_limit, redis_pool.clone())
        .context("Failed to create rate limiter")?
        .map(Arc::new);

    info!(
        "Pre-startup processing completed in {} ms",
        start_time.elapsed().as_millis()
    );

    Ok(StartupContext {
        service,
        rate_limiter,
        redis_pool,
    })
}

async fn flush_cache(cache: &dyn CacheStore) {
    match cache.flush_namespace().await {
        Ok(deleted) => info!("{} set: flushed {} cached keys", FLUSH_ENV, deleted),
        Err(e) => warn!("{} set but cache flush failed: {}", FLUSH_ENV, e),
    }
}
