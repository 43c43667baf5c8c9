//! 查询服务性能基准测试

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use goip::cache::{CacheStore, MokaCacheStore};
use goip::config::ProviderRegion;
use goip::errors::Result;
use goip::models::GeoRecord;
use goip::services::{GeoIpLookup, LookupService, MultiProviderResolver, ProviderEntry};
use goip::utils::ip::parse_ip;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 所有 IP 都返回同一条带城市信息的记录
struct FixedProvider;

#[async_trait]
impl GeoIpLookup for FixedProvider {
    async fn lookup(&self, ip: &str) -> Result<GeoRecord> {
        parse_ip(ip)?;
        let mut record = GeoRecord::new(ip);
        record.country.iso_code = "US".to_string();
        record.country.name = "United States".to_string();
        record.city.name = "Ashburn".to_string();
        Ok(record)
    }

    fn kind(&self) -> &str {
        "maxmind"
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn build_service() -> Arc<LookupService> {
    let resolver = MultiProviderResolver::new(vec![ProviderEntry::new(
        Arc::new(FixedProvider),
        1,
        ProviderRegion::All,
    )])
    .unwrap();
    let cache: Arc<dyn CacheStore> =
        Arc::new(MokaCacheStore::new(Duration::from_secs(3600), 100_000));
    Arc::new(LookupService::new(Arc::new(resolver), cache))
}

// ============== 单条查询 ==============

fn bench_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = build_service();

    rt.block_on(async {
        service.lookup("8.8.8.8").await.unwrap();
    });

    let hit = Arc::clone(&service);
    c.bench_function("lookup/cache_hit", |b| {
        b.to_async(&rt).iter(|| {
            let s = Arc::clone(&hit);
            async move { s.lookup("8.8.8.8").await }
        });
    });

    let miss = Arc::clone(&service);
    let counter = AtomicU64::new(0);
    c.bench_function("lookup/cache_miss", |b| {
        b.to_async(&rt).iter(|| {
            let s = Arc::clone(&miss);
            let n = counter.fetch_add(1, Ordering::Relaxed);
            let ip = format!("10.{}.{}.{}", (n >> 16) & 0xff, (n >> 8) & 0xff, n & 0xff);
            async move { s.lookup(&ip).await }
        });
    });

    let invalid = Arc::clone(&service);
    c.bench_function("lookup/invalid_ip", |b| {
        b.to_async(&rt).iter(|| {
            let s = Arc::clone(&invalid);
            async move { s.lookup("999.999.999.999").await }
        });
    });
}

// ============== 批量查询 ==============

fn bench_batch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("batch");

    for size in [10usize, 50, 100] {
        let ips: Vec<String> = (0..size)
            .map(|i| format!("172.16.{}.{}", i / 256, i % 256))
            .collect();
        group.throughput(Throughput::Elements(size as u64));

        // 预热后全部命中缓存
        let service = build_service();
        rt.block_on(async {
            service.batch(&ips).await.unwrap();
        });
        group.bench_with_input(BenchmarkId::new("cached", size), &ips, |b, ips| {
            b.to_async(&rt).iter(|| {
                let s = Arc::clone(&service);
                let ips = ips.clone();
                async move { s.batch(&ips).await }
            });
        });

        // 缓存关闭，每次都走 provider
        let resolver = MultiProviderResolver::new(vec![ProviderEntry::new(
            Arc::new(FixedProvider),
            1,
            ProviderRegion::All,
        )])
        .unwrap();
        let uncached = Arc::new(LookupService::new(
            Arc::new(resolver),
            Arc::new(goip::cache::NullCacheStore),
        ));
        group.bench_with_input(BenchmarkId::new("uncached", size), &ips, |b, ips| {
            b.to_async(&rt).iter(|| {
                let s = Arc::clone(&uncached);
                let ips = ips.clone();
                async move { s.batch(&ips).await }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lookup, bench_batch);
criterion_main!(benches);
