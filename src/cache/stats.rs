//! 缓存层计数器

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::models::CacheStats;

#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    ops: AtomicU64,
    latency_us: AtomicU64,
}

impl CacheCounters {
    pub fn hit(&self, n: u64) {
        self.hits.fetch_add(n, Ordering::Relaxed);
    }

    pub fn miss(&self, n: u64) {
        self.misses.fetch_add(n, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, elapsed: Duration) {
        self.ops.fetch_add(1, Ordering::Relaxed);
        self.latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// 填充命中/错误/延迟字段，其余字段由调用方补充
    pub fn snapshot(&self, backend: &str) -> CacheStats {
        let ops = self.ops.load(Ordering::Relaxed);
        let avg_latency_ms = if ops == 0 {
            0.0
        } else {
            self.latency_us.load(Ordering::Relaxed) as f64 / ops as f64 / 1000.0
        };

        CacheStats {
            backend: backend.to_string(),
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            avg_latency_ms,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = CacheCounters::default();
        assert_eq!(counters.snapshot("memory").avg_latency_ms, 0.0);

        counters.hit(3);
        counters.miss(1);
        counters.error();
        counters.record_latency(Duration::from_micros(1500));
        counters.record_latency(Duration::from_micros(500));

        let stats = counters.snapshot("memory");
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.cache_hits, 3);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.errors, 1);
        assert!((stats.avg_latency_ms - 1.0).abs() < f64::EPSILON);
    }
}
