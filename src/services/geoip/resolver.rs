//! 多 provider 解析器
//!
//! 查询策略：
//! 1. 有 maxmind 时先用它判断国家（失败只记录日志）
//! 2. 国家为 CN 且配置了 ipip → ipip 为主；否则 maxmind 为主；都没有则取优先级最高者
//! 3. 主 provider 结果没有城市信息时，按优先级依次尝试其余 provider，
//!    返回第一个带城市信息的结果
//! 4. 都没有城市信息时返回主结果；主 provider 失败则返回第一个成功结果
//! 5. 全部失败时：都是 NotFound → NotFound，都是 Unavailable → Unavailable，否则 AllFailed

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::provider::GeoIpLookup;
use crate::config::ProviderRegion;
use crate::errors::{GoipError, Result};
use crate::models::{GeoRecord, ProviderKind};
use crate::utils::ip::parse_ip;

/// 解析器中的一个 provider 条目，构造后不可变
#[derive(Clone)]
pub struct ProviderEntry {
    pub provider: Arc<dyn GeoIpLookup>,
    /// 数值越小优先级越高
    pub priority: i32,
    pub region: ProviderRegion,
}

impl ProviderEntry {
    pub fn new(provider: Arc<dyn GeoIpLookup>, priority: i32, region: ProviderRegion) -> Self {
        Self {
            provider,
            priority,
            region,
        }
    }

    fn kind(&self) -> &str {
        self.provider.kind()
    }
}

/// 单个 provider 的健康状态
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderHealth {
    pub kind: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct MultiProviderResolver {
    entries: Vec<ProviderEntry>,
}

impl MultiProviderResolver {
    /// 按优先级升序（稳定排序）构造
    pub fn new(mut entries: Vec<ProviderEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(GoipError::no_providers("no providers configured"));
        }
        entries.sort_by_key(|e| e.priority);

        info!(
            "GeoIP resolver initialized with providers: [{}]",
            entries
                .iter()
                .map(|e| format!("{}({})", e.kind(), e.priority))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { entries })
    }

    fn position(&self, kind: ProviderKind) -> Option<usize> {
        self.entries.iter().position(|e| e.kind() == kind.as_str())
    }

    async fn query(entry: &ProviderEntry, ip: &str) -> Result<GeoRecord> {
        let mut record = entry.provider.lookup(ip).await?;
        record.provider = entry.kind().to_string();
        Ok(record)
    }

    /// 智能查询，见模块文档
    pub async fn lookup(&self, ip: &str) -> Result<GeoRecord> {
        parse_ip(ip)?;

        let maxmind_idx = self.position(ProviderKind::MaxMind);
        let mut first: Option<Result<GeoRecord>> = None;
        if let Some(idx) = maxmind_idx {
            let result = Self::query(&self.entries[idx], ip).await;
            if let Err(e) = &result {
                debug!("GeoIP: maxmind first lookup for {} failed: {}", ip, e);
            }
            first = Some(result);
        }

        let first_is_cn = matches!(&first, Some(Ok(r)) if r.country.iso_code == "CN");
        let primary_idx = match self.position(ProviderKind::Ipip) {
            Some(idx) if first_is_cn => idx,
            _ => maxmind_idx.unwrap_or(0),
        };

        let primary = if Some(primary_idx) == maxmind_idx {
            first.take().unwrap_or_else(|| {
                Err(GoipError::unavailable("maxmind first lookup result missing"))
            })
        } else {
            Self::query(&self.entries[primary_idx], ip).await
        };

        let mut errors = Vec::new();
        let primary = match primary {
            Ok(record) if record.has_city_info() => return Ok(record),
            Ok(record) => Some(record),
            Err(e) => {
                debug!(
                    "GeoIP: primary provider {} failed for {}: {}",
                    self.entries[primary_idx].kind(),
                    ip,
                    e
                );
                errors.push(e);
                None
            }
        };

        // 完整性回退
        let mut first_success: Option<GeoRecord> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            if idx == primary_idx {
                continue;
            }

            // maxmind 已经探测过，复用结果
            let reused = if Some(idx) == maxmind_idx {
                first.take()
            } else {
                None
            };
            let result = match reused {
                Some(result) => result,
                None => Self::query(entry, ip).await,
            };

            match result {
                Ok(record) if record.has_city_info() => {
                    debug!(
                        "GeoIP: {} has no city info, fell back to {}",
                        self.entries[primary_idx].kind(),
                        entry.kind()
                    );
                    return Ok(record);
                }
                Ok(record) => {
                    first_success.get_or_insert(record);
                }
                Err(e) => {
                    debug!("GeoIP: provider {} failed for {}: {}", entry.kind(), ip, e);
                    errors.push(e);
                }
            }
        }

        if let Some(record) = primary.or(first_success) {
            return Ok(record);
        }

        if errors.iter().all(|e| e.is_not_found()) {
            Err(GoipError::not_found(format!("{} not found in any provider", ip)))
        } else if errors.iter().all(|e| matches!(e, GoipError::Unavailable(_))) {
            // 全部 provider 已关闭或正在重载
            Err(errors.swap_remove(0))
        } else {
            warn!("GeoIP: all providers failed for {}", ip);
            Err(GoipError::all_failed(format!(
                "all providers failed to lookup {}: {}",
                ip,
                errors
                    .iter()
                    .map(|e| e.message().to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            )))
        }
    }

    /// 使用指定 provider 查询，不走智能路由
    pub async fn lookup_with(&self, ip: &str, kind: &str) -> Result<GeoRecord> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.kind() == kind)
            .ok_or_else(|| GoipError::provider_not_found(format!("provider not found: {}", kind)))?;
        Self::query(entry, ip).await
    }

    /// 去重后的 provider 类型，按优先级排列
    pub fn list_kinds(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|e| e.kind())
            .filter(|kind| seen.insert(*kind))
            .map(str::to_string)
            .collect()
    }

    /// 重新加载指定类型的所有文件型 provider
    pub fn reload(&self, kind: &str, path: &str) -> Result<usize> {
        let mut reloaded = 0;
        for entry in self.entries.iter().filter(|e| e.kind() == kind) {
            entry.provider.reload(path)?;
            reloaded += 1;
        }
        if reloaded == 0 {
            return Err(GoipError::provider_not_found(format!(
                "provider not found: {}",
                kind
            )));
        }
        Ok(reloaded)
    }

    /// 关闭所有 provider，汇总错误
    pub fn close(&self) -> Result<()> {
        let errors: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| {
                e.provider
                    .close()
                    .err()
                    .map(|err| format!("{}: {}", e.kind(), err.message()))
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GoipError::unavailable(format!(
                "failed to close providers: {}",
                errors.join("; ")
            )))
        }
    }

    pub async fn health(&self) -> Vec<ProviderHealth> {
        let mut report = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let result = entry.provider.health_check().await;
            report.push(ProviderHealth {
                kind: entry.kind().to_string(),
                healthy: result.is_ok(),
                error: result.err().map(|e| e.message().to_string()),
            });
        }
        report
    }
}
