//! 按客户端 IP 的滑动窗口限流
//!
//! 两个窗口（分钟 / 小时）依次检查，任一超限即拒绝。
//! 存储后端不可用时放行请求（fail-open）。

mod memory;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use memory::GovernorBackend;
pub use self::redis::RedisSlidingWindow;

use crate::cache::RedisPool;
use crate::config::RateLimitConfig;
use crate::errors::{GoipError, Result};

pub const RATE_LIMIT_KEY_PREFIX: &str = "goip:ratelimit:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Minute,
    Hour,
}

impl Window {
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Minute => "minute",
            Window::Hour => "hour",
        }
    }

    pub fn seconds(&self) -> u64 {
        match self {
            Window::Minute => 60,
            Window::Hour => 3600,
        }
    }
}

pub fn rate_limit_key(client: &str, window: Window) -> String {
    format!("{}{}:{}", RATE_LIMIT_KEY_PREFIX, client, window.as_str())
}

/// 限流存储后端
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// 在窗口内记录一次请求；超限时返回需要等待的秒数（至少 1）
    async fn hit(&self, client: &str, window: Window, limit: u32) -> Result<Option<u64>>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited {
        window: Window,
        limit: u32,
        retry_after: u64,
    },
}

pub struct RateLimiter {
    backend: Arc<dyn RateLimitBackend>,
    per_minute: u32,
    per_hour: u32,
}

impl RateLimiter {
    pub fn new(backend: Arc<dyn RateLimitBackend>, per_minute: u32, per_hour: u32) -> Self {
        Self {
            backend,
            per_minute,
            per_hour,
        }
    }

    /// 根据配置创建；未启用时返回 None
    pub fn from_config(
        config: &RateLimitConfig,
        redis_pool: Option<Arc<RedisPool>>,
    ) -> Result<Option<Self>> {
        if !config.enabled {
            info!("Rate limiting disabled");
            return Ok(None);
        }

        let backend: Arc<dyn RateLimitBackend> = match config.storage.as_str() {
            "redis" => {
                let pool = redis_pool.ok_or_else(|| {
                    GoipError::config("redis rate limit storage requires a redis pool")
                })?;
                Arc::new(RedisSlidingWindow::new(pool))
            }
            "memory" => Arc::new(GovernorBackend::new(
                config.requests_per_minute,
                config.requests_per_hour,
            )),
            other => {
                return Err(GoipError::config(format!(
                    "unknown rate limit storage: {}",
                    other
                )));
            }
        };

        info!(
            "Rate limiting enabled: {}/min, {}/hour ({} storage)",
            config.requests_per_minute,
            config.requests_per_hour,
            backend.name()
        );
        Ok(Some(Self::new(
            backend,
            config.requests_per_minute,
            config.requests_per_hour,
        )))
    }

    pub async fn check(&self, client: &str) -> RateLimitDecision {
        for (window, limit) in [
            (Window::Minute, self.per_minute),
            (Window::Hour, self.per_hour),
        ] {
            if limit == 0 {
                continue;
            }

            match self.backend.hit(client, window, limit).await {
                Ok(None) => {}
                Ok(Some(retry_after)) => {
                    debug!(
                        "Rate limit exceeded for {} ({} window, limit {})",
                        client,
                        window.as_str(),
                        limit
                    );
                    return RateLimitDecision::Limited {
                        window,
                        limit,
                        retry_after,
                    };
                }
                Err(e) => {
                    warn!(
                        "Rate limit check failed for {}, allowing request: {}",
                        client, e
                    );
                }
            }
        }
        RateLimitDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 固定窗口计数，便于断言
    #[derive(Default)]
    struct CountingBackend {
        counts: Mutex<HashMap<String, u32>>,
        broken: bool,
    }

    #[async_trait]
    impl RateLimitBackend for CountingBackend {
        async fn hit(&self, client: &str, window: Window, limit: u32) -> Result<Option<u64>> {
            if self.broken {
                return Err(GoipError::cache_store("connection refused"));
            }
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(rate_limit_key(client, window)).or_insert(0);
            let seen = *count;
            *count += 1;
            Ok((seen >= limit).then_some(window.seconds()))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(
            rate_limit_key("203.0.113.9", Window::Minute),
            "goip:ratelimit:203.0.113.9:minute"
        );
        assert_eq!(
            rate_limit_key("203.0.113.9", Window::Hour),
            "goip:ratelimit:203.0.113.9:hour"
        );
    }

    #[tokio::test]
    async fn test_limit_plus_one_rejected_once() {
        let limiter = RateLimiter::new(Arc::new(CountingBackend::default()), 3, 0);
        for _ in 0..3 {
            assert_eq!(limiter.check("1.1.1.1").await, RateLimitDecision::Allowed);
        }
        assert_eq!(
            limiter.check("1.1.1.1").await,
            RateLimitDecision::Limited {
                window: Window::Minute,
                limit: 3,
                retry_after: 60
            }
        );
        // 其他客户端不受影响
        assert_eq!(limiter.check("2.2.2.2").await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn test_hour_window() {
        let limiter = RateLimiter::new(Arc::new(CountingBackend::default()), 100, 2);
        limiter.check("1.1.1.1").await;
        limiter.check("1.1.1.1").await;
        assert!(matches!(
            limiter.check("1.1.1.1").await,
            RateLimitDecision::Limited {
                window: Window::Hour,
                limit: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fail_open() {
        let backend = CountingBackend {
            broken: true,
            ..Default::default()
        };
        let limiter = RateLimiter::new(Arc::new(backend), 1, 1);
        for _ in 0..5 {
            assert_eq!(limiter.check("1.1.1.1").await, RateLimitDecision::Allowed);
        }
    }

    #[test]
    fn test_from_config() {
        let mut config = RateLimitConfig {
            storage: "memory".to_string(),
            ..Default::default()
        };
        assert!(RateLimiter::from_config(&config, None).unwrap().is_some());

        config.storage = "redis".to_string();
        assert!(RateLimiter::from_config(&config, None).is_err());

        config.enabled = false;
        assert!(RateLimiter::from_config(&config, None).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_storage_admits_requests_per_minute() {
        let config = RateLimitConfig {
            storage: "memory".to_string(),
            ..Default::default()
        };
        let limiter = RateLimiter::from_config(&config, None).unwrap().unwrap();

        let mut rejected = 0;
        for _ in 0..=config.requests_per_minute {
            if limiter.check("1.1.1.1").await != RateLimitDecision::Allowed {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 1);
    }
}
