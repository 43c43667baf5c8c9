//! 进程内限流（governor）
//!
//! GCRA 算法近似滑动窗口，每个窗口一个按客户端 IP 分 key 的限流器。
//! 突发容量等于窗口上限：空闲客户端在一个窗口内最多放行 `limit` 次。

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::debug;

use super::{RateLimitBackend, Window};
use crate::errors::Result;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// 超过该数量的 key 时清理已恢复满额的条目
const MAX_TRACKED_KEYS: usize = 100_000;

pub struct GovernorBackend {
    minute: Option<KeyedLimiter>,
    hour: Option<KeyedLimiter>,
    clock: DefaultClock,
}

impl GovernorBackend {
    /// 上限为 0 的窗口不创建限流器
    pub fn new(per_minute: u32, per_hour: u32) -> Self {
        let build = |limit: u32, quota: fn(NonZeroU32) -> Quota| {
            let limit = NonZeroU32::new(limit)?;
            Some(RateLimiter::keyed(quota(limit).allow_burst(limit)))
        };

        Self {
            minute: build(per_minute, Quota::per_minute),
            hour: build(per_hour, Quota::per_hour),
            clock: DefaultClock::default(),
        }
    }

    fn limiter(&self, window: Window) -> Option<&KeyedLimiter> {
        match window {
            Window::Minute => self.minute.as_ref(),
            Window::Hour => self.hour.as_ref(),
        }
    }
}

#[async_trait]
impl RateLimitBackend for GovernorBackend {
    async fn hit(&self, client: &str, window: Window, _limit: u32) -> Result<Option<u64>> {
        let Some(limiter) = self.limiter(window) else {
            return Ok(None);
        };

        if limiter.len() > MAX_TRACKED_KEYS {
            limiter.retain_recent();
            debug!("Rate limiter ({}) pruned to {} keys", window.as_str(), limiter.len());
        }

        match limiter.check_key(&client.to_string()) {
            Ok(()) => Ok(None),
            Err(not_until) => {
                let wait: Duration = not_until.wait_time_from(self.clock.now());
                Ok(Some(wait.as_secs().max(1)))
            }
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_then_reject() {
        let backend = GovernorBackend::new(3, 0);
        for _ in 0..3 {
            assert_eq!(backend.hit("1.1.1.1", Window::Minute, 3).await.unwrap(), None);
        }
        let retry = backend.hit("1.1.1.1", Window::Minute, 3).await.unwrap();
        assert!(matches!(retry, Some(secs) if secs >= 1));

        // 其他客户端独立计数
        assert_eq!(backend.hit("2.2.2.2", Window::Minute, 3).await.unwrap(), None);
        // 上限为 0 的窗口不限流
        assert_eq!(backend.hit("1.1.1.1", Window::Hour, 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_full_window_admitted_before_first_rejection() {
        let backend = GovernorBackend::new(100, 0);
        let mut rejected = 0;
        for _ in 0..101 {
            if backend.hit("1.1.1.1", Window::Minute, 100).await.unwrap().is_some() {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 1);
    }
}
