//! Shared fixtures for integration tests
//!
//! `StubProvider` stands in for a database or API provider with a fixed
//! record table, optional latency and in-flight tracking.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use goip::cache::{CacheStore, MokaCacheStore};
use goip::config::ProviderRegion;
use goip::errors::{GoipError, Result};
use goip::models::{City, Country, GeoRecord};
use goip::services::{GeoIpLookup, LookupService, MultiProviderResolver, ProviderEntry};
use goip::utils::ip::parse_ip;

pub struct StubProvider {
    kind: &'static str,
    records: HashMap<String, GeoRecord>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: AtomicBool,
}

impl StubProvider {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            records: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_record(mut self, record: GeoRecord) -> Self {
        self.records.insert(record.ip.clone(), record);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoIpLookup for StubProvider {
    async fn lookup(&self, ip: &str) -> Result<GeoRecord> {
        parse_ip(ip)?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(GoipError::unavailable("database is closed"));
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        // 查询期间被关闭时不返回半成品
        if self.closed.load(Ordering::SeqCst) {
            return Err(GoipError::unavailable("database is closed"));
        }

        self.records
            .get(ip)
            .cloned()
            .ok_or_else(|| GoipError::not_found(format!("{} not in {}", ip, self.kind)))
    }

    fn kind(&self) -> &str {
        self.kind
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn record(ip: &str, iso_code: &str, country: &str, city: &str) -> GeoRecord {
    GeoRecord {
        country: Country {
            iso_code: iso_code.to_string(),
            name: country.to_string(),
            ..Default::default()
        },
        city: City {
            name: city.to_string(),
            ..Default::default()
        },
        ..GeoRecord::new(ip)
    }
}

/// maxmind: 8.8.8.8 (US, city), 1.1.1.1 (AU, no city), 114.114.114.114 (CN, no city)
pub fn maxmind_stub() -> StubProvider {
    StubProvider::new("maxmind")
        .with_record(record("8.8.8.8", "US", "United States", "Mountain View"))
        .with_record(record("1.1.1.1", "AU", "Australia", ""))
        .with_record(record("114.114.114.114", "CN", "China", ""))
}

/// ipip: 114.114.114.114 with a Chinese city name
pub fn ipip_stub() -> StubProvider {
    let mut cn = record("114.114.114.114", "CN", "中国", "");
    cn.country.name_zh = "中国".to_string();
    cn.city.name_zh = "江苏南京".to_string();
    StubProvider::new("ipip").with_record(cn)
}

pub fn memory_cache() -> Arc<dyn CacheStore> {
    Arc::new(MokaCacheStore::new(Duration::from_secs(300), 10_000))
}

/// Providers get priorities in list order
pub fn build_service(
    providers: Vec<Arc<StubProvider>>,
    cache: Arc<dyn CacheStore>,
) -> Arc<LookupService> {
    let entries = providers
        .into_iter()
        .enumerate()
        .map(|(idx, p)| ProviderEntry::new(p, idx as i32 + 1, ProviderRegion::All))
        .collect();
    let resolver = MultiProviderResolver::new(entries).expect("resolver");
    Arc::new(LookupService::new(Arc::new(resolver), cache))
}

/// Builds the real router around `service`
#[allow(unused_macros)]
macro_rules! init_app {
    ($service:expr, $limiter:expr, $max_batch:expr) => {{
        let limiter: Option<std::sync::Arc<goip::ratelimit::RateLimiter>> = $limiter;
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(goip::api::middleware::RecoveryMiddleware)
                .wrap(goip::api::middleware::AccessLogMiddleware)
                .wrap(goip::api::middleware::RequestIdMiddleware)
                .app_data(actix_web::web::Data::from($service))
                .app_data(actix_web::web::Data::new(goip::config::BatchConfig {
                    max_size: $max_batch,
                }))
                .app_data(actix_web::web::Data::new(
                    goip::api::services::AppStartTime::default(),
                ))
                .configure(move |cfg| goip::api::configure(cfg, limiter)),
        )
        .await
    }};
}
