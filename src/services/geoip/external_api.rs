//! 外部 GeoIP API 实现
//!
//! 支持三家公开 API，每家一个纯函数负责把 JSON 响应翻译为 `GeoRecord`：
//! - ip-api.com: `http://ip-api.com/json/{ip}`
//! - ipinfo.io: `https://ipinfo.io/{ip}/json`
//! - ipapi.co: `https://ipapi.co/{ip}/json/`
//!
//! ureq 是同步客户端，请求在 `spawn_blocking` 中执行。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{trace, warn};
use ureq::Agent;

use super::provider::GeoIpLookup;
use crate::errors::{GoipError, Result};
use crate::models::{City, Continent, Country, GeoRecord, Location, ProviderKind};
use crate::utils::ip::parse_ip;

/// 单次 HTTP 请求的超时上限
pub const MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// 外部 API 供应商
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    IpApi,
    IpInfo,
    IpApiCo,
}

impl Vendor {
    pub fn url(&self, ip: &str) -> String {
        match self {
            Vendor::IpApi => format!("http://ip-api.com/json/{}", ip),
            Vendor::IpInfo => format!("https://ipinfo.io/{}/json", ip),
            Vendor::IpApiCo => format!("https://ipapi.co/{}/json/", ip),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Vendor::IpApi => ProviderKind::IpApi,
            Vendor::IpInfo => ProviderKind::IpInfo,
            Vendor::IpApiCo => ProviderKind::IpApiCo,
        }
    }

    /// 将响应 JSON 转换为记录
    pub fn parse(&self, ip: &str, json: &Value) -> Result<GeoRecord> {
        match self {
            Vendor::IpApi => parse_ip_api(ip, json),
            Vendor::IpInfo => parse_ipinfo(ip, json),
            Vendor::IpApiCo => parse_ipapi_co(ip, json),
        }
    }
}

/// 外部 API GeoIP Provider
pub struct ExternalApiProvider {
    vendor: Vendor,
    agent: Agent,
}

impl ExternalApiProvider {
    /// 创建 provider，超时被限制在 `MAX_HTTP_TIMEOUT` 以内
    pub fn new(vendor: Vendor, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            MAX_HTTP_TIMEOUT
        } else {
            timeout.min(MAX_HTTP_TIMEOUT)
        };

        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self { vendor, agent }
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// 同步请求（在 spawn_blocking 中调用）
    fn fetch_sync(agent: &Agent, url: &str) -> Result<Value> {
        let resp = match agent.get(url).call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => {
                return Err(GoipError::not_found(format!(
                    "GeoIP API \"{}\" returned status {}",
                    url, code
                )));
            }
            Err(e) => {
                warn!("GeoIP API request to \"{}\" failed: {}", url, e);
                return Err(GoipError::provider_transport(format!(
                    "request to {} failed: {}",
                    url, e
                )));
            }
        };

        resp.into_body().read_json::<Value>().map_err(|e| {
            warn!("GeoIP API response from \"{}\" parse failed: {}", url, e);
            GoipError::provider_transport(format!("invalid response from {}: {}", url, e))
        })
    }
}

#[async_trait]
impl GeoIpLookup for ExternalApiProvider {
    async fn lookup(&self, ip: &str) -> Result<GeoRecord> {
        parse_ip(ip)?;

        let url = self.vendor.url(ip);
        let agent = self.agent.clone();
        let json = tokio::task::spawn_blocking(move || Self::fetch_sync(&agent, &url))
            .await
            .map_err(|e| GoipError::provider_transport(format!("spawn_blocking failed: {}", e)))??;

        let record = self.vendor.parse(ip, &json)?;
        trace!(
            "{} lookup for {}: country={}, city={}",
            self.kind(),
            ip,
            record.country.iso_code,
            record.city.name
        );
        Ok(record)
    }

    fn kind(&self) -> &str {
        self.vendor.kind().as_str()
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn str_field<'a>(json: &'a Value, key: &str) -> &'a str {
    json[key].as_str().unwrap_or_default()
}

fn base_record(ip: &str, kind: ProviderKind) -> GeoRecord {
    GeoRecord {
        ip: ip.to_string(),
        provider: kind.to_string(),
        ..Default::default()
    }
}

/// ip-api.com
///
/// 成功：`{"status":"success","country":"United States","countryCode":"US",...}`
/// 失败：`{"status":"fail","message":"private range"}`
pub fn parse_ip_api(ip: &str, json: &Value) -> Result<GeoRecord> {
    if str_field(json, "status") != "success" {
        return Err(GoipError::not_found(format!(
            "ip-api: {} ({})",
            ip,
            str_field(json, "message")
        )));
    }

    let mut record = base_record(ip, ProviderKind::IpApi);
    record.country = Country {
        iso_code: str_field(json, "countryCode").to_string(),
        name: str_field(json, "country").to_string(),
        name_zh: String::new(),
    };
    record.city = City {
        name: str_field(json, "city").to_string(),
        name_zh: String::new(),
        postal_code: str_field(json, "zip").to_string(),
    };
    record.location = Location::from_coordinates(
        json["lat"].as_f64().unwrap_or(0.0),
        json["lon"].as_f64().unwrap_or(0.0),
        str_field(json, "timezone"),
    );
    Ok(record)
}

/// ipinfo.io
///
/// `country` 只给出 ISO 代码，坐标为 `"lat,lon"` 字符串；保留地址带 `bogon: true`
pub fn parse_ipinfo(ip: &str, json: &Value) -> Result<GeoRecord> {
    if json["bogon"].as_bool().unwrap_or(false) {
        return Err(GoipError::not_found(format!("ipinfo: {} is a bogon address", ip)));
    }
    if json.get("error").is_some() {
        return Err(GoipError::not_found(format!("ipinfo: no data for {}", ip)));
    }

    let country = str_field(json, "country");
    let mut record = base_record(ip, ProviderKind::IpInfo);
    record.country = Country {
        iso_code: country.to_string(),
        name: country.to_string(),
        name_zh: String::new(),
    };
    record.city = City {
        name: str_field(json, "city").to_string(),
        name_zh: String::new(),
        postal_code: str_field(json, "postal").to_string(),
    };

    if let Some((lat, lon)) = str_field(json, "loc").split_once(',') {
        let lat = lat.trim().parse::<f64>().unwrap_or(0.0);
        let lon = lon.trim().parse::<f64>().unwrap_or(0.0);
        record.location = Location::from_coordinates(lat, lon, str_field(json, "timezone"));
    }
    Ok(record)
}

/// ipapi.co
///
/// 失败时返回 `{"error": true, "reason": "..."}`
pub fn parse_ipapi_co(ip: &str, json: &Value) -> Result<GeoRecord> {
    if json["error"].as_bool().unwrap_or(false) {
        return Err(GoipError::not_found(format!(
            "ipapi.co: {} ({})",
            ip,
            str_field(json, "reason")
        )));
    }

    let mut record = base_record(ip, ProviderKind::IpApiCo);
    record.country = Country {
        iso_code: str_field(json, "country_code").to_string(),
        name: str_field(json, "country_name").to_string(),
        name_zh: String::new(),
    };
    record.city = City {
        name: str_field(json, "city").to_string(),
        name_zh: String::new(),
        postal_code: str_field(json, "postal").to_string(),
    };

    let continent_code = str_field(json, "continent_code");
    if !continent_code.is_empty() {
        record.continent = Some(Continent {
            code: continent_code.to_string(),
            name: String::new(),
        });
    }

    record.location = Location::from_coordinates(
        json["latitude"].as_f64().unwrap_or(0.0),
        json["longitude"].as_f64().unwrap_or(0.0),
        str_field(json, "timezone"),
    );
    Ok(record)
}
