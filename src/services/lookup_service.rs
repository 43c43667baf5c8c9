//! IP lookup service
//!
//! Cache-aside pipeline shared by all HTTP handlers:
//! cache hit → return; miss → resolver → write-through → return.
//! Batch lookups use one multi-get, a bounded fan-out over the misses
//! and one multi-set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::errors::Result;
use crate::models::{BatchResult, GeoRecord, ProviderKind, RecordSource, ServiceStats};
use crate::services::geoip::MultiProviderResolver;
use crate::utils::ip::parse_ip;

/// Max provider lookups in flight per batch request
pub const BATCH_CONCURRENCY: usize = 10;

#[derive(Debug, Default)]
struct Counters {
    total_queries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_errors: AtomicU64,
    /// accumulated query time in microseconds
    total_time_us: AtomicU64,
    query_count: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn record_time(&self, elapsed: Duration) {
        Self::add(&self.total_time_us, elapsed.as_micros() as u64);
        Self::add(&self.query_count, 1);
    }
}

pub struct LookupService {
    resolver: Arc<MultiProviderResolver>,
    cache: Arc<dyn CacheStore>,
    stats: Counters,
}

impl LookupService {
    pub fn new(resolver: Arc<MultiProviderResolver>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            resolver,
            cache,
            stats: Counters::default(),
        }
    }

    pub fn resolver(&self) -> &Arc<MultiProviderResolver> {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Tag a provider record with its source and stamp the query time
    fn finish_record(record: &mut GeoRecord, elapsed: Duration) {
        record.source = Some(ProviderKind::source_of(&record.provider));
        record.query_time_ms = elapsed.as_millis() as u64;
    }

    /// Look up a single IP (cache-aside)
    pub async fn lookup(&self, ip: &str) -> Result<GeoRecord> {
        let start = Instant::now();
        Counters::add(&self.stats.total_queries, 1);

        if let Err(e) = parse_ip(ip) {
            Counters::add(&self.stats.total_errors, 1);
            return Err(e);
        }

        // 1. cache
        match self.cache.get(ip).await {
            Ok(Some(mut record)) => {
                Counters::add(&self.stats.cache_hits, 1);
                record.source = Some(RecordSource::Cache);
                self.stats.record_time(start.elapsed());
                return Ok(record);
            }
            Ok(None) => {}
            Err(e) => warn!("Cache error for {}, falling back to providers: {}", ip, e),
        }
        Counters::add(&self.stats.cache_misses, 1);

        // 2. providers
        let mut record = match self.resolver.lookup(ip).await {
            Ok(record) => record,
            Err(e) => {
                Counters::add(&self.stats.total_errors, 1);
                return Err(e);
            }
        };
        Self::finish_record(&mut record, start.elapsed());

        // 3. write-through
        if self.cache.is_enabled() {
            record.cached_at = Some(Utc::now());
            if let Err(e) = self.cache.set(ip, &record).await {
                warn!("Failed to cache result for {}: {}", ip, e);
            }
        }

        self.stats.record_time(start.elapsed());
        Ok(record)
    }

    /// Look up many IPs; results keep input order, failures are only counted
    pub async fn batch(&self, ips: &[String]) -> Result<BatchResult> {
        if ips.is_empty() {
            return Ok(BatchResult::default());
        }

        let start = Instant::now();
        let total = ips.len();
        Counters::add(&self.stats.total_queries, total as u64);

        // 1. one multi-get
        let cached = match self.cache.mget(ips).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Cache mget failed, querying providers for all IPs: {}", e);
                HashMap::new()
            }
        };

        let hits = ips.iter().filter(|ip| cached.contains_key(*ip)).count();
        Counters::add(&self.stats.cache_hits, hits as u64);
        Counters::add(&self.stats.cache_misses, (total - hits) as u64);

        let mut seen = HashSet::new();
        let missing: Vec<String> = ips
            .iter()
            .filter(|ip| !cached.contains_key(*ip) && seen.insert(ip.as_str()))
            .cloned()
            .collect();

        // 2. bounded fan-out
        let mut fresh = self.resolve_many(missing).await;

        // 3. one multi-set
        if self.cache.is_enabled() && !fresh.is_empty() {
            let now = Utc::now();
            for record in fresh.values_mut() {
                record.cached_at = Some(now);
            }
            if let Err(e) = self.cache.mset(&fresh).await {
                warn!("Failed to cache {} batch results: {}", fresh.len(), e);
            }
        }

        // 4. assemble in input order
        let mut results = Vec::with_capacity(total);
        for ip in ips {
            if let Some(record) = cached.get(ip) {
                let mut record = record.clone();
                record.source = Some(RecordSource::Cache);
                results.push(record);
            } else if let Some(record) = fresh.get(ip) {
                results.push(record.clone());
            }
        }

        self.stats.record_time(start.elapsed());

        let success = results.len();
        debug!(
            "Batch lookup: {} total, {} cached, {} succeeded",
            total, hits, success
        );
        Ok(BatchResult {
            results,
            total,
            success,
            failed: total - success,
        })
    }

    async fn resolve_many(&self, ips: Vec<String>) -> HashMap<String, GeoRecord> {
        let semaphore = Arc::new(Semaphore::new(BATCH_CONCURRENCY));
        let mut tasks = JoinSet::new();

        for ip in ips {
            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let start = Instant::now();
                let result = resolver.lookup(&ip).await;
                (ip, result, start.elapsed())
            });
        }

        let mut fresh = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((ip, Ok(mut record), elapsed)) => {
                    Self::finish_record(&mut record, elapsed);
                    fresh.insert(ip, record);
                }
                Ok((ip, Err(e), _)) => {
                    Counters::add(&self.stats.total_errors, 1);
                    debug!("Batch lookup failed for {}: {}", ip, e);
                }
                Err(e) => {
                    Counters::add(&self.stats.total_errors, 1);
                    error!("Batch lookup task failed: {}", e);
                }
            }
        }
        fresh
    }

    /// Query one named provider, bypassing the cache
    pub async fn lookup_with(&self, ip: &str, kind: &str) -> Result<GeoRecord> {
        let start = Instant::now();
        Counters::add(&self.stats.total_queries, 1);

        let mut record = match self.resolver.lookup_with(ip, kind).await {
            Ok(record) => record,
            Err(e) => {
                Counters::add(&self.stats.total_errors, 1);
                return Err(e);
            }
        };
        Self::finish_record(&mut record, start.elapsed());
        self.stats.record_time(start.elapsed());
        Ok(record)
    }

    /// Drop cached results for the given IPs
    pub async fn invalidate(&self, ips: &[String]) -> Result<u64> {
        let deleted = self.cache.delete(ips).await?;
        info!("Invalidated {} cache entries ({} requested)", deleted, ips.len());
        Ok(deleted)
    }

    pub fn available_providers(&self) -> Vec<String> {
        self.resolver.list_kinds()
    }

    pub fn stats(&self) -> ServiceStats {
        let total_queries = self.stats.total_queries.load(Ordering::Relaxed);
        let cache_hits = self.stats.cache_hits.load(Ordering::Relaxed);
        let query_count = self.stats.query_count.load(Ordering::Relaxed);

        let cache_hit_rate = if total_queries == 0 {
            0.0
        } else {
            cache_hits as f64 / total_queries as f64 * 100.0
        };
        let avg_query_time_ms = if query_count == 0 {
            0.0
        } else {
            self.stats.total_time_us.load(Ordering::Relaxed) as f64 / query_count as f64 / 1000.0
        };

        ServiceStats {
            total_queries,
            cache_hits,
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            cache_hit_rate,
            avg_query_time_ms,
            total_errors: self.stats.total_errors.load(Ordering::Relaxed),
        }
    }

    /// Release providers and cache connections
    pub async fn close(&self) -> Result<()> {
        let resolver_result = self.resolver.close();
        if let Err(e) = self.cache.close().await {
            warn!("Failed to close cache: {}", e);
        }
        resolver_result
    }
}
