use std::collections::HashMap;

use async_trait::async_trait;
use tracing::trace;

use super::traits::CacheStore;
use crate::errors::Result;
use crate::models::{CacheStats, GeoRecord};

/// 缓存关闭时使用：读永远未命中，写直接丢弃
pub struct NullCacheStore;

#[async_trait]
impl CacheStore for NullCacheStore {
    async fn get(&self, ip: &str) -> Result<Option<GeoRecord>> {
        trace!("NullCacheStore.get called for: {}", ip);
        Ok(None)
    }

    async fn mget(&self, _ips: &[String]) -> Result<HashMap<String, GeoRecord>> {
        Ok(HashMap::new())
    }

    async fn set(&self, ip: &str, _record: &GeoRecord) -> Result<()> {
        trace!("NullCacheStore.set called for: {}", ip);
        Ok(())
    }

    async fn mset(&self, _records: &HashMap<String, GeoRecord>) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _ips: &[String]) -> Result<u64> {
        Ok(0)
    }

    async fn exists(&self, _ip: &str) -> Result<bool> {
        Ok(false)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn flush_prefix(&self) -> Result<u64> {
        Ok(0)
    }

    async fn flush_namespace(&self) -> Result<u64> {
        Ok(0)
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats {
            backend: self.backend_name().to_string(),
            ..Default::default()
        })
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "none"
    }
}
