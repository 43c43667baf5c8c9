//! IPIP.NET 数据库实现
//!
//! 使用本地 .ipdb 文件，中文数据，对国内 IP 的城市级精度优于 MaxMind。
//! 与 MaxMind 一样通过 `ArcSwapOption` 支持热替换。

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, trace};

use super::ipdb::IpdbReader;
use super::provider::GeoIpLookup;
use crate::errors::{GoipError, Result};
use crate::models::{City, Continent, Country, GeoRecord, Location, ProviderKind};
use crate::utils::ip::parse_ip;

/// IPIP 数据库只提供中文数据
const LANGUAGE: &str = "CN";

pub struct IpipProvider {
    reader: ArcSwapOption<IpdbReader>,
    db_path: RwLock<String>,
}

impl IpipProvider {
    pub fn new(path: &str) -> Result<Self> {
        let reader = IpdbReader::open(path)?;
        info!(
            "IPIP database loaded from {} (build {}, {} fields)",
            path,
            reader.meta().build,
            reader.meta().fields.len()
        );
        Ok(Self {
            reader: ArcSwapOption::from_pointee(reader),
            db_path: RwLock::new(path.to_string()),
        })
    }

    pub fn db_path(&self) -> String {
        self.db_path.read().clone()
    }
}

/// 将 IPDB 字段映射为 GeoRecord
///
/// 城市中文名由 `region_name + city_name` 拼接（如 "广东深圳"）
pub(crate) fn record_from_fields(ip: &str, fields: &HashMap<String, String>) -> GeoRecord {
    let get = |key: &str| fields.get(key).map(String::as_str).unwrap_or_default();

    let city_name = get("city_name");
    let city_name_zh = if city_name.is_empty() {
        String::new()
    } else {
        format!("{}{}", get("region_name"), city_name)
    };

    let continent = Some(get("continent_code"))
        .filter(|code| !code.is_empty())
        .map(|code| Continent {
            code: code.to_string(),
            name: String::new(),
        });

    let latitude = get("latitude").parse::<f64>().unwrap_or(0.0);
    let longitude = get("longitude").parse::<f64>().unwrap_or(0.0);
    let location = Location::from_coordinates(latitude, longitude, get("timezone"));

    GeoRecord {
        ip: ip.to_string(),
        country: Country {
            iso_code: get("country_code").to_string(),
            name: get("country_name").to_string(),
            name_zh: get("country_name").to_string(),
        },
        city: City {
            name: city_name.to_string(),
            name_zh: city_name_zh,
            postal_code: String::new(),
        },
        continent,
        location,
        provider: ProviderKind::Ipip.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl GeoIpLookup for IpipProvider {
    async fn lookup(&self, ip: &str) -> Result<GeoRecord> {
        let ip_addr = parse_ip(ip)?;

        let reader = self
            .reader
            .load_full()
            .ok_or_else(|| GoipError::unavailable("IPIP database is closed"))?;

        let Some(fields) = reader.find_map(ip_addr, LANGUAGE)? else {
            return Err(GoipError::not_found(format!(
                "{} not found in IPIP database",
                ip
            )));
        };

        let record = record_from_fields(ip, &fields);
        trace!(
            "IPIP lookup for {}: country={}, city={}",
            ip, record.country.name, record.city.name_zh
        );
        Ok(record)
    }

    fn kind(&self) -> &str {
        ProviderKind::Ipip.as_str()
    }

    fn close(&self) -> Result<()> {
        self.reader.store(None);
        Ok(())
    }

    fn reload(&self, path: &str) -> Result<()> {
        let reader = IpdbReader::open(path)?;
        self.reader.store(Some(Arc::new(reader)));
        *self.db_path.write() = path.to_string();
        info!("IPIP database reloaded from {}", path);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        if self.reader.load().is_some() {
            Ok(())
        } else {
            Err(GoipError::unavailable("IPIP database is closed"))
        }
    }
}
