use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{CacheStats, GeoRecord};

/// 查询结果缓存
///
/// key 布局为 `goip:country:<ip>`，value 为 JSON 序列化的 `GeoRecord`。
/// 调用方把所有错误视为非致命：读失败按未命中处理，写失败只记录日志。
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 未命中返回 `Ok(None)`
    async fn get(&self, ip: &str) -> Result<Option<GeoRecord>>;

    /// 批量读取，未命中的 IP 不出现在结果中
    async fn mget(&self, ips: &[String]) -> Result<HashMap<String, GeoRecord>>;

    async fn set(&self, ip: &str, record: &GeoRecord) -> Result<()>;

    /// 批量写入，序列化失败的条目被跳过
    async fn mset(&self, records: &HashMap<String, GeoRecord>) -> Result<()>;

    /// 返回实际删除的 key 数量
    async fn delete(&self, ips: &[String]) -> Result<u64>;

    async fn exists(&self, ip: &str) -> Result<bool>;

    async fn health_check(&self) -> Result<()>;

    /// 删除所有查询结果（`goip:country:*`）
    async fn flush_prefix(&self) -> Result<u64>;

    /// 删除整个命名空间（`goip:*`），包括限流计数
    async fn flush_namespace(&self) -> Result<u64>;

    async fn stats(&self) -> Result<CacheStats>;

    /// 缓存关闭时为 false
    fn is_enabled(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
