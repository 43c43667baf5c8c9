//! 进程内缓存实现（Moka）
//!
//! key 布局与 Redis 相同，适合单实例部署或没有 Redis 的测试环境。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, trace};

use super::stats::CacheCounters;
use super::traits::CacheStore;
use super::{COUNTRY_KEY_PREFIX, KEY_NAMESPACE, country_key};
use crate::errors::Result;
use crate::models::{CacheStats, GeoRecord};

pub struct MokaCacheStore {
    inner: Cache<String, GeoRecord>,
    counters: CacheCounters,
}

impl MokaCacheStore {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        debug!(
            "MokaCacheStore initialized with max capacity: {}, TTL: {}s",
            max_capacity,
            ttl.as_secs()
        );
        Self {
            inner,
            counters: CacheCounters::default(),
        }
    }

    async fn invalidate_matching(&self, prefix: &str) -> u64 {
        let keys: Vec<String> = self
            .inner
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in &keys {
            self.inner.invalidate(key).await;
        }
        keys.len() as u64
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn get(&self, ip: &str) -> Result<Option<GeoRecord>> {
        let start = Instant::now();
        let value = self.inner.get(&country_key(ip)).await;
        self.counters.record_latency(start.elapsed());

        if value.is_some() {
            self.counters.hit(1);
            trace!("Cache hit: {}", ip);
        } else {
            self.counters.miss(1);
            trace!("Cache miss: {}", ip);
        }
        Ok(value)
    }

    async fn mget(&self, ips: &[String]) -> Result<HashMap<String, GeoRecord>> {
        let start = Instant::now();
        let mut found = HashMap::with_capacity(ips.len());
        for ip in ips {
            if let Some(record) = self.inner.get(&country_key(ip)).await {
                found.insert(ip.clone(), record);
            }
        }
        self.counters.record_latency(start.elapsed());
        self.counters.hit(found.len() as u64);
        self.counters.miss((ips.len() - found.len()) as u64);
        Ok(found)
    }

    async fn set(&self, ip: &str, record: &GeoRecord) -> Result<()> {
        let start = Instant::now();
        self.inner.insert(country_key(ip), record.clone()).await;
        self.counters.record_latency(start.elapsed());
        Ok(())
    }

    async fn mset(&self, records: &HashMap<String, GeoRecord>) -> Result<()> {
        let start = Instant::now();
        for (ip, record) in records {
            self.inner.insert(country_key(ip), record.clone()).await;
        }
        self.counters.record_latency(start.elapsed());
        Ok(())
    }

    async fn delete(&self, ips: &[String]) -> Result<u64> {
        let mut deleted = 0;
        for ip in ips {
            if self.inner.remove(&country_key(ip)).await.is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn exists(&self, ip: &str) -> Result<bool> {
        Ok(self.inner.contains_key(&country_key(ip)))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn flush_prefix(&self) -> Result<u64> {
        Ok(self.invalidate_matching(COUNTRY_KEY_PREFIX).await)
    }

    async fn flush_namespace(&self) -> Result<u64> {
        Ok(self.invalidate_matching(KEY_NAMESPACE).await)
    }

    async fn stats(&self) -> Result<CacheStats> {
        self.inner.run_pending_tasks().await;
        let mut stats = self.counters.snapshot(self.backend_name());
        stats.key_count = self.inner.entry_count();
        Ok(stats)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
