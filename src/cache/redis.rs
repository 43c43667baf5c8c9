//! Redis 缓存实现
//!
//! `RedisPool` 维护少量 round-robin 复用的 MultiplexedConnection：
//! - 连接懒加载，出错后重置，下次使用时重新建立
//! - 每个命令都受超时约束
//! - 启动时预热 `min_idle_conns` 个连接
//!
//! 限流器与缓存共用同一个连接池。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{FromRedisValue, RedisError};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use super::stats::CacheCounters;
use super::traits::CacheStore;
use super::{COUNTRY_KEY_PREFIX, KEY_NAMESPACE, country_key};
use crate::config::RedisConfig;
use crate::errors::{GoipError, Result};
use crate::models::{CacheStats, GeoRecord};

/// SCAN 每次返回数量，同时也是 DEL 的批大小
const SCAN_BATCH_SIZE: usize = 1000;

#[derive(Clone, Copy)]
enum Request<'a> {
    Cmd(&'a redis::Cmd),
    Pipe(&'a redis::Pipeline),
}

type Slot = Arc<RwLock<Option<MultiplexedConnection>>>;

pub struct RedisPool {
    client: redis::Client,
    slots: Vec<Slot>,
    next_slot: AtomicUsize,
    min_idle: usize,
    max_retries: u32,
    dial_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    pool_hits: AtomicU64,
    pool_misses: AtomicU64,
    pool_timeouts: AtomicU64,
}

impl RedisPool {
    /// 只校验 URL，不建立连接
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url())?;
        let pool_size = config.pool_size.max(1);

        debug!(
            "Redis pool created for {}:{}/{} (pool_size: {}, min_idle: {})",
            config.host, config.port, config.db, pool_size, config.min_idle_conns
        );

        Ok(Self {
            client,
            slots: (0..pool_size)
                .map(|_| Arc::new(RwLock::new(None)))
                .collect(),
            next_slot: AtomicUsize::new(0),
            min_idle: config.min_idle_conns.min(pool_size),
            max_retries: config.max_retries,
            dial_timeout: config.dial_timeout,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            pool_hits: AtomicU64::new(0),
            pool_misses: AtomicU64::new(0),
            pool_timeouts: AtomicU64::new(0),
        })
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// 预热连接，返回成功建立的数量
    pub async fn warm_up(&self) -> usize {
        let mut established = 0;
        for slot in self.slots.iter().take(self.min_idle) {
            match self.slot_connection(slot).await {
                Ok(_) => established += 1,
                Err(e) => {
                    warn!("Redis warm-up failed: {}", e);
                    break;
                }
            }
        }
        if established > 0 {
            info!("Redis pool warmed up with {} connection(s)", established);
        }
        established
    }

    /// 获取或建立 slot 上的连接（双重检查）
    async fn slot_connection(&self, slot: &Slot) -> Result<MultiplexedConnection> {
        {
            let guard = slot.read().await;
            if let Some(ref conn) = *guard {
                self.pool_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(conn.clone());
            }
        }

        let mut guard = slot.write().await;
        if let Some(ref conn) = *guard {
            self.pool_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(conn.clone());
        }

        self.pool_misses.fetch_add(1, Ordering::Relaxed);
        let conn = match timeout(
            self.dial_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                self.pool_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(GoipError::cache_store(format!(
                    "redis dial timed out after {}ms",
                    self.dial_timeout.as_millis()
                )));
            }
        };

        *guard = Some(conn.clone());
        debug!("Redis connection established and cached");
        Ok(conn)
    }

    async fn reset_slot(&self, idx: usize) {
        *self.slots[idx].write().await = None;
        debug!("Redis connection {} reset due to error", idx);
    }

    async fn execute<T: FromRedisValue>(
        &self,
        op: &str,
        request: Request<'_>,
        limit: Duration,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            let idx = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.slots.len();
            let mut conn = match self.slot_connection(&self.slots[idx]).await {
                Ok(conn) => conn,
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!("Redis {} connect failed (attempt {}): {}", op, attempt, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let query = async {
                match request {
                    Request::Cmd(cmd) => cmd.query_async::<T>(&mut conn).await,
                    Request::Pipe(pipe) => pipe.query_async::<T>(&mut conn).await,
                }
            };

            match timeout(limit, query).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    if is_connection_error(&e) {
                        self.reset_slot(idx).await;
                        if attempt < self.max_retries {
                            attempt += 1;
                            debug!("Redis {} failed (attempt {}): {}", op, attempt, e);
                            continue;
                        }
                    }
                    error!("Redis {} failed: {}", op, e);
                    return Err(e.into());
                }
                Err(_) => {
                    self.pool_timeouts.fetch_add(1, Ordering::Relaxed);
                    warn!("Redis {} timed out after {}ms", op, limit.as_millis());
                    return Err(GoipError::cache_store(format!(
                        "redis {} timed out after {}ms",
                        op,
                        limit.as_millis()
                    )));
                }
            }
        }
    }

    pub async fn query<T: FromRedisValue>(
        &self,
        op: &str,
        cmd: &redis::Cmd,
        limit: Duration,
    ) -> Result<T> {
        self.execute(op, Request::Cmd(cmd), limit).await
    }

    pub async fn query_pipe<T: FromRedisValue>(
        &self,
        op: &str,
        pipe: &redis::Pipeline,
        limit: Duration,
    ) -> Result<T> {
        self.execute(op, Request::Pipe(pipe), limit).await
    }

    pub async fn ping(&self) -> Result<()> {
        let pong: String = self
            .query("PING", &redis::cmd("PING"), self.read_timeout)
            .await?;
        trace!("Redis PING: {}", pong);
        Ok(())
    }

    /// 连接池计数器 (hits, misses, timeouts)
    pub fn pool_counters(&self) -> (u64, u64, u64) {
        (
            self.pool_hits.load(Ordering::Relaxed),
            self.pool_misses.load(Ordering::Relaxed),
            self.pool_timeouts.load(Ordering::Relaxed),
        )
    }

    pub async fn close(&self) {
        for slot in &self.slots {
            *slot.write().await = None;
        }
        debug!("Redis pool closed");
    }
}

fn is_connection_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal()
}

/// 从 INFO 输出中读取数值字段
pub(crate) fn parse_info_field(info: &str, field: &str) -> u64 {
    info.lines()
        .filter_map(|line| line.trim().split_once(':'))
        .find(|(key, _)| *key == field)
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

pub struct RedisCacheStore {
    pool: Arc<RedisPool>,
    ttl_secs: u64,
    counters: CacheCounters,
}

impl RedisCacheStore {
    pub fn new(pool: Arc<RedisPool>, ttl: Duration) -> Self {
        let ttl_secs = ttl.as_secs().max(1);
        debug!("RedisCacheStore created with TTL: {}s", ttl_secs);
        Self {
            pool,
            ttl_secs,
            counters: CacheCounters::default(),
        }
    }

    /// 统一记录延迟和错误
    async fn observe<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let start = Instant::now();
        let result = fut.await;
        self.counters.record_latency(start.elapsed());
        if result.is_err() {
            self.counters.error();
        }
        result
    }

    async fn scan_page(&self, cursor: u64, pattern: &str) -> Result<(u64, Vec<String>)> {
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH_SIZE);
        self.pool
            .query("SCAN", &cmd, self.pool.read_timeout())
            .await
    }

    /// 统计匹配 pattern 的键数（SCAN 可能重复返回同一键，结果为近似值）
    async fn scan_count(&self, pattern: &str) -> Result<u64> {
        let mut cursor: u64 = 0;
        let mut count = 0u64;
        loop {
            let (next, batch) = self.scan_page(cursor, pattern).await?;
            count += batch.len() as u64;
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(count)
    }

    /// 边扫描边删除，内存中最多保留一批待删除的键
    async fn scan_and_delete(&self, pattern: &str) -> Result<u64> {
        let mut cursor: u64 = 0;
        let mut pending = DeleteBatches::new(SCAN_BATCH_SIZE);
        let mut deleted = 0;
        loop {
            let (next, batch) = self.scan_page(cursor, pattern).await?;
            for chunk in pending.push(batch) {
                deleted += self.delete_keys(&chunk).await?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        if let Some(rest) = pending.finish() {
            deleted += self.delete_keys(&rest).await?;
        }

        info!("Redis: deleted {} keys matching '{}'", deleted, pattern);
        Ok(deleted)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<u64> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        let deleted = self
            .pool
            .query::<u64>("DEL", &cmd, self.pool.write_timeout())
            .await?;
        debug!("Redis: DEL batch of {} keys removed {}", keys.len(), deleted);
        Ok(deleted)
    }
}

/// SCAN 结果的删除缓冲：凑满 `size` 个键即交出一批
struct DeleteBatches {
    pending: Vec<String>,
    size: usize,
}

impl DeleteBatches {
    fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            pending: Vec::with_capacity(size),
            size,
        }
    }

    /// 追加一页 SCAN 结果，返回已凑满的批次
    fn push(&mut self, keys: Vec<String>) -> Vec<Vec<String>> {
        self.pending.extend(keys);
        let mut ready = Vec::new();
        while self.pending.len() >= self.size {
            let rest = self.pending.split_off(self.size);
            ready.push(std::mem::replace(&mut self.pending, rest));
        }
        ready
    }

    /// 剩余不足一批的键
    fn finish(self) -> Option<Vec<String>> {
        (!self.pending.is_empty()).then_some(self.pending)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, ip: &str) -> Result<Option<GeoRecord>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(country_key(ip));

        let data: Option<String> = self
            .observe(self.pool.query("GET", &cmd, self.pool.read_timeout()))
            .await?;

        match data {
            Some(data) => {
                let record: GeoRecord = serde_json::from_str(&data).map_err(|e| {
                    self.counters.error();
                    error!("Failed to deserialize cached record for '{}': {}", ip, e);
                    GoipError::from(e)
                })?;
                self.counters.hit(1);
                trace!("Cache hit: {}", ip);
                Ok(Some(record))
            }
            None => {
                self.counters.miss(1);
                trace!("Cache miss: {}", ip);
                Ok(None)
            }
        }
    }

    async fn mget(&self, ips: &[String]) -> Result<HashMap<String, GeoRecord>> {
        if ips.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<String> = ips.iter().map(|ip| country_key(ip)).collect();
        let mut cmd = redis::cmd("MGET");
        cmd.arg(&keys);

        let values: Vec<Option<String>> = self
            .observe(self.pool.query("MGET", &cmd, self.pool.read_timeout()))
            .await?;

        let mut found = HashMap::with_capacity(values.len());
        for (ip, value) in ips.iter().zip(values) {
            let Some(data) = value else { continue };
            match serde_json::from_str::<GeoRecord>(&data) {
                Ok(record) => {
                    found.insert(ip.clone(), record);
                }
                Err(e) => warn!("Skipping undecodable cache entry for '{}': {}", ip, e),
            }
        }

        self.counters.hit(found.len() as u64);
        self.counters.miss((ips.len() - found.len()) as u64);
        Ok(found)
    }

    async fn set(&self, ip: &str, record: &GeoRecord) -> Result<()> {
        let data = serde_json::to_string(record)?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(country_key(ip)).arg(data).arg("EX").arg(self.ttl_secs);

        self.observe(self.pool.query::<()>("SET", &cmd, self.pool.write_timeout()))
            .await?;
        trace!("Cached {} for {}s", ip, self.ttl_secs);
        Ok(())
    }

    async fn mset(&self, records: &HashMap<String, GeoRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        let mut queued = 0;
        for (ip, record) in records {
            match serde_json::to_string(record) {
                Ok(data) => {
                    pipe.set_ex(country_key(ip), data, self.ttl_secs).ignore();
                    queued += 1;
                }
                Err(e) => warn!("Skipping unserializable record for '{}': {}", ip, e),
            }
        }
        if queued == 0 {
            return Ok(());
        }

        self.observe(
            self.pool
                .query_pipe::<()>("MSET", &pipe, self.pool.write_timeout()),
        )
        .await?;
        trace!("Cached {} records in one pipeline", queued);
        Ok(())
    }

    async fn delete(&self, ips: &[String]) -> Result<u64> {
        if ips.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = ips.iter().map(|ip| country_key(ip)).collect();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(&keys);

        self.observe(self.pool.query("DEL", &cmd, self.pool.write_timeout()))
            .await
    }

    async fn exists(&self, ip: &str) -> Result<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(country_key(ip));
        self.observe(self.pool.query("EXISTS", &cmd, self.pool.read_timeout()))
            .await
    }

    async fn health_check(&self) -> Result<()> {
        self.pool.ping().await
    }

    async fn flush_prefix(&self) -> Result<u64> {
        self.scan_and_delete(&format!("{}*", COUNTRY_KEY_PREFIX))
            .await
    }

    async fn flush_namespace(&self) -> Result<u64> {
        self.scan_and_delete(&format!("{}*", KEY_NAMESPACE)).await
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut stats = self.counters.snapshot(self.backend_name());
        let (pool_hits, pool_misses, pool_timeouts) = self.pool.pool_counters();
        stats.pool_hits = pool_hits;
        stats.pool_misses = pool_misses;
        stats.pool_timeouts = pool_timeouts;

        let memory: String = self
            .pool
            .query(
                "INFO",
                redis::cmd("INFO").arg("memory"),
                self.pool.read_timeout(),
            )
            .await?;
        let info_stats: String = self
            .pool
            .query(
                "INFO",
                redis::cmd("INFO").arg("stats"),
                self.pool.read_timeout(),
            )
            .await?;
        // 只统计本服务的记录键，不含同库中的其他键
        let key_count = self
            .scan_count(&format!("{}*", COUNTRY_KEY_PREFIX))
            .await?;

        stats.used_memory = parse_info_field(&memory, "used_memory");
        stats.evicted_keys = parse_info_field(&info_stats, "evicted_keys");
        stats.key_count = key_count;
        Ok(stats)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
