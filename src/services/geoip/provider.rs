//! GeoIP Provider 抽象层
//!
//! 每种数据源实现 `GeoIpLookup`，由 `build_provider` 根据配置条目创建：
//! - maxmind → MaxMindProvider（.mmdb）
//! - ipip → IpipProvider（.ipdb）
//! - ip-api / ipinfo / ipapi.co → ExternalApiProvider

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::external_api::{ExternalApiProvider, Vendor};
use super::ipip::IpipProvider;
use super::maxmind::MaxMindProvider;
use crate::config::{ExternalApiConfig, ProviderConfig};
use crate::errors::{GoipError, Result};
use crate::models::{GeoRecord, ProviderKind};

/// GeoIP 查询 trait
///
/// 约定：
/// - 无法解析的 IP 在访问后端之前返回 `InvalidIp`
/// - `close` 幂等，关闭后 `lookup` 返回 `Unavailable`
/// - `reload` 只对文件型 provider 有意义，其余实现为空操作
#[async_trait]
pub trait GeoIpLookup: Send + Sync {
    /// 查询 IP 地址的地理位置
    async fn lookup(&self, ip: &str) -> Result<GeoRecord>;

    /// provider 类型标识
    fn kind(&self) -> &str;

    /// 释放底层句柄
    fn close(&self) -> Result<()>;

    /// 原子替换数据库文件
    fn reload(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    /// 健康检查
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// 根据配置条目创建 provider
pub fn build_provider(
    config: &ProviderConfig,
    api_config: &ExternalApiConfig,
) -> Result<Arc<dyn GeoIpLookup>> {
    let provider: Arc<dyn GeoIpLookup> = match config.kind {
        ProviderKind::MaxMind => Arc::new(MaxMindProvider::new(require_path(config)?)?),
        ProviderKind::Ipip => Arc::new(IpipProvider::new(require_path(config)?)?),
        ProviderKind::IpApi => Arc::new(ExternalApiProvider::new(Vendor::IpApi, api_config.timeout)),
        ProviderKind::IpInfo => {
            Arc::new(ExternalApiProvider::new(Vendor::IpInfo, api_config.timeout))
        }
        ProviderKind::IpApiCo => {
            Arc::new(ExternalApiProvider::new(Vendor::IpApiCo, api_config.timeout))
        }
    };

    info!(
        "GeoIP: Initialized {} provider (priority {}, region '{}')",
        provider.kind(),
        config.priority,
        config.region
    );
    Ok(provider)
}

fn require_path(config: &ProviderConfig) -> Result<&str> {
    config
        .db_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| GoipError::config(format!("{} provider requires db_path", config.kind)))
}
