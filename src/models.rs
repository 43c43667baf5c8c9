//! 核心数据模型
//!
//! - `GeoRecord`: 一次查询的地理位置结果，也是缓存中存储的值
//! - `ProviderKind`: provider 类型标识
//! - `BatchResult` / `ServiceStats` / `CacheStats`: 对外返回的汇总结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// 国家信息
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Country {
    #[serde(default)]
    pub iso_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_zh: String,
}

/// 城市信息，未知时为空字符串
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct City {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_zh: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub postal_code: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Continent {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub time_zone: String,
}

impl Location {
    /// 经纬度均为 0 视为没有坐标
    pub fn from_coordinates(latitude: f64, longitude: f64, time_zone: &str) -> Option<Self> {
        if latitude == 0.0 && longitude == 0.0 {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
            time_zone: time_zone.to_string(),
        })
    }
}

/// 结果来源，由 LookupService 标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordSource {
    Cache,
    Db,
    Api,
}

/// Provider 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum ProviderKind {
    #[serde(rename = "maxmind")]
    #[strum(serialize = "maxmind")]
    MaxMind,
    #[serde(rename = "ipip")]
    #[strum(serialize = "ipip")]
    Ipip,
    #[serde(rename = "ip-api")]
    #[strum(serialize = "ip-api")]
    IpApi,
    #[serde(rename = "ipinfo")]
    #[strum(serialize = "ipinfo")]
    IpInfo,
    #[serde(rename = "ipapi.co")]
    #[strum(serialize = "ipapi.co")]
    IpApiCo,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::MaxMind => "maxmind",
            ProviderKind::Ipip => "ipip",
            ProviderKind::IpApi => "ip-api",
            ProviderKind::IpInfo => "ipinfo",
            ProviderKind::IpApiCo => "ipapi.co",
        }
    }

    /// 远程 HTTP API 类 provider
    pub fn is_external_api(&self) -> bool {
        matches!(
            self,
            ProviderKind::IpApi | ProviderKind::IpInfo | ProviderKind::IpApiCo
        )
    }

    /// 基于本地数据库文件的 provider（需要 db_path，支持 reload）
    pub fn is_file_backed(&self) -> bool {
        matches!(self, ProviderKind::MaxMind | ProviderKind::Ipip)
    }

    /// 根据 provider 名称推断结果来源
    pub fn source_of(kind: &str) -> RecordSource {
        match kind.parse::<ProviderKind>() {
            Ok(k) if k.is_external_api() => RecordSource::Api,
            _ => RecordSource::Db,
        }
    }
}

/// 一次 IP 查询的结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoRecord {
    pub ip: String,
    #[serde(default)]
    pub country: Country,
    #[serde(default)]
    pub city: City,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continent: Option<Continent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RecordSource>,
    #[serde(default)]
    pub query_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

impl GeoRecord {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Default::default()
        }
    }

    /// 是否包含城市级信息（完整性回退的判定条件）
    pub fn has_city_info(&self) -> bool {
        !self.city.name.is_empty() || !self.city.name_zh.is_empty()
    }
}

/// 批量查询请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub ips: Vec<String>,
}

/// 批量查询结果，results 按输入顺序排列，失败项只计数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<GeoRecord>,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// 服务统计快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub avg_query_time_ms: f64,
    pub total_errors: u64,
}

/// 缓存层统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub backend: String,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub pool_timeouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    pub used_memory: u64,
    pub key_count: u64,
    pub evicted_keys: u64,
}
