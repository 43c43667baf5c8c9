//! 查询结果缓存
//!
//! - `redis`: 多实例共享（默认）
//! - `memory`: 进程内 Moka 缓存
//! - `null`: `cache.enabled = false` 时使用

pub mod memory;
pub mod null;
pub mod redis;
pub mod stats;
pub mod traits;

use std::sync::Arc;

use tracing::info;

pub use memory::MokaCacheStore;
pub use null::NullCacheStore;
pub use self::redis::{RedisCacheStore, RedisPool};
pub use traits::CacheStore;

use crate::config::CacheConfig;
use crate::errors::{GoipError, Result};

/// 本服务写入的所有 key 都在这个命名空间下
pub const KEY_NAMESPACE: &str = "goip:";
/// 查询结果 key 前缀
pub const COUNTRY_KEY_PREFIX: &str = "goip:country:";

pub fn country_key(ip: &str) -> String {
    format!("{}{}", COUNTRY_KEY_PREFIX, ip)
}

/// 根据配置创建缓存；redis 后端需要调用方提供连接池
pub fn create_cache_store(
    config: &CacheConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Result<Arc<dyn CacheStore>> {
    if !config.enabled {
        info!("Cache disabled, using NullCacheStore");
        return Ok(Arc::new(NullCacheStore));
    }

    let store: Arc<dyn CacheStore> = match config.backend.as_str() {
        "redis" => {
            let pool = redis_pool
                .ok_or_else(|| GoipError::config("redis cache backend requires a redis pool"))?;
            Arc::new(RedisCacheStore::new(pool, config.ttl))
        }
        "memory" => Arc::new(MokaCacheStore::new(config.ttl, config.memory_capacity)),
        other => {
            return Err(GoipError::config(format!(
                "unknown cache backend: {}",
                other
            )));
        }
    };

    info!(
        "Cache initialized: {} (TTL: {}s)",
        store.backend_name(),
        config.ttl.as_secs()
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_key_layout() {
        assert_eq!(country_key("8.8.8.8"), "goip:country:8.8.8.8");
        assert!(country_key("2001:db8::1").starts_with(KEY_NAMESPACE));
    }

    #[test]
    fn test_create_cache_store() {
        let mut config = CacheConfig {
            backend: "memory".to_string(),
            ..Default::default()
        };
        assert_eq!(create_cache_store(&config, None).unwrap().backend_name(), "memory");

        config.backend = "redis".to_string();
        assert!(create_cache_store(&config, None).is_err());

        config.backend = "memcached".to_string();
        assert!(create_cache_store(&config, None).is_err());

        config.enabled = false;
        assert!(!create_cache_store(&config, None).unwrap().is_enabled());
    }
}
