//! Redis 有序集合实现的滑动窗口
//!
//! 每个请求以微秒时间戳为 score 写入 `goip:ratelimit:<ip>:<window>`，
//! 一个原子 pipeline 内完成：清理窗口外记录 → 计数 → 写入 → 续期。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{trace, warn};

use super::{RateLimitBackend, Window, rate_limit_key};
use crate::cache::RedisPool;
use crate::errors::{GoipError, Result};

/// key 在窗口结束后多保留的秒数
const EXPIRE_GRACE_SECS: u64 = 60;

pub struct RedisSlidingWindow {
    pool: Arc<RedisPool>,
}

impl RedisSlidingWindow {
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }
}

/// 根据窗口内最早一条记录计算需要等待的秒数，至少 1 秒
pub(crate) fn retry_after_secs(oldest_us: i64, window_us: i64, now_us: i64) -> u64 {
    let remaining_us = oldest_us + window_us - now_us;
    if remaining_us <= 0 {
        return 1;
    }
    (remaining_us as u64).div_ceil(1_000_000).max(1)
}

/// 已超限时的等待秒数；读取最早记录失败或窗口为空时按整个窗口计算
pub(crate) fn limited_retry_after(
    oldest: std::result::Result<Vec<(String, f64)>, GoipError>,
    window: Window,
    now_us: i64,
) -> u64 {
    let window_us = window.seconds() as i64 * 1_000_000;
    match oldest {
        Ok(entries) => match entries.first() {
            Some((_, score)) => retry_after_secs(*score as i64, window_us, now_us),
            None => window.seconds(),
        },
        Err(e) => {
            warn!("Failed to read oldest rate limit entry, using full window: {}", e);
            window.seconds()
        }
    }
}

#[async_trait]
impl RateLimitBackend for RedisSlidingWindow {
    async fn hit(&self, client: &str, window: Window, limit: u32) -> Result<Option<u64>> {
        let key = rate_limit_key(client, window);
        let now_us = Utc::now().timestamp_micros();
        let window_us = window.seconds() as i64 * 1_000_000;
        // 同一微秒内的多个请求需要不同的 member
        let member = format!("{}-{:08x}", now_us, rand::random::<u32>());

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrembyscore(&key, 0, now_us - window_us)
            .ignore()
            .zcard(&key)
            .zadd(&key, member, now_us)
            .ignore()
            .expire(&key, (window.seconds() + EXPIRE_GRACE_SECS) as i64)
            .ignore();

        let (count,): (u64,) = self
            .pool
            .query_pipe("RATELIMIT", &pipe, self.pool.write_timeout())
            .await?;
        trace!("Rate limit {}: {} requests in window", key, count);

        if count < u64::from(limit) {
            return Ok(None);
        }

        let mut oldest_cmd = redis::cmd("ZRANGE");
        oldest_cmd.arg(&key).arg(0).arg(0).arg("WITHSCORES");
        let oldest = self
            .pool
            .query("ZRANGE", &oldest_cmd, self.pool.read_timeout())
            .await;

        // 请求已计入窗口，读取失败也按超限处理
        Ok(Some(limited_retry_after(oldest, window, now_us)))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
