//! 配置校验
//!
//! 启动时一次性检查所有配置项，错误合并后一起返回。

use super::StaticConfig;
use crate::errors::{GoipError, Result};

/// 批量查询允许的最大上限
pub const BATCH_MAX_LIMIT: usize = 1000;

const CACHE_BACKENDS: &[&str] = &["redis", "memory"];
const RATE_LIMIT_STORAGES: &[&str] = &["redis", "memory"];
const LOG_FORMATS: &[&str] = &["json", "text", "console"];

/// 校验整个配置
pub fn validate_config(config: &StaticConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    if config.server.port == 0 {
        errors.push("invalid server port: 0".to_string());
    }

    if config.batch.max_size == 0 || config.batch.max_size > BATCH_MAX_LIMIT {
        errors.push(format!(
            "invalid batch max_size: {} (must be 1-{})",
            config.batch.max_size, BATCH_MAX_LIMIT
        ));
    }

    if config.cache.enabled && config.cache.ttl.is_zero() {
        errors.push("cache ttl must be greater than 0".to_string());
    }

    if !CACHE_BACKENDS.contains(&config.cache.backend.as_str()) {
        errors.push(format!(
            "invalid cache backend '{}'. Valid: {:?}",
            config.cache.backend, CACHE_BACKENDS
        ));
    }

    if !RATE_LIMIT_STORAGES.contains(&config.rate_limit.storage.as_str()) {
        errors.push(format!(
            "invalid rate_limit storage '{}'. Valid: {:?}",
            config.rate_limit.storage, RATE_LIMIT_STORAGES
        ));
    }

    if !LOG_FORMATS.contains(&config.log.format.as_str()) {
        errors.push(format!(
            "invalid log format '{}'. Valid: {:?}",
            config.log.format, LOG_FORMATS
        ));
    }

    if config.redis.pool_size == 0 {
        errors.push("redis pool_size must be at least 1".to_string());
    }

    let providers = config.effective_providers();
    if providers.is_empty() {
        errors.push("at least one provider is required (providers or maxmind.db_path)".to_string());
    }
    for (idx, provider) in providers.iter().enumerate() {
        if provider.kind.is_file_backed()
            && provider.db_path.as_deref().is_none_or(str::is_empty)
        {
            errors.push(format!(
                "providers[{}] ({}) requires db_path",
                idx, provider.kind
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(GoipError::config(errors.join("; ")))
    }
}
