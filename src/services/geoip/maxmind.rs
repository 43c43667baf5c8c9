//! MaxMind GeoLite2 / GeoIP2 数据库实现
//!
//! 使用本地 .mmdb 文件（City 或 Country 库均可）进行查询。
//! reader 存放在 `ArcSwapOption` 中：reload 时原子替换，
//! 正在进行的查询继续持有旧 reader，最后一个引用释放时旧文件内存才被回收。

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use maxminddb::{Reader, geoip2};
use parking_lot::RwLock;
use tracing::{info, trace};

use super::provider::GeoIpLookup;
use crate::errors::{GoipError, Result};
use crate::models::{City, Continent, Country, GeoRecord, Location, ProviderKind};
use crate::utils::ip::parse_ip;

/// MaxMind GeoIP Provider
pub struct MaxMindProvider {
    reader: ArcSwapOption<Reader<Vec<u8>>>,
    db_path: RwLock<String>,
}

impl MaxMindProvider {
    /// 从文件路径创建 MaxMind Provider
    pub fn new(path: &str) -> Result<Self> {
        let reader = Self::open(path)?;
        Ok(Self {
            reader: ArcSwapOption::from_pointee(reader),
            db_path: RwLock::new(path.to_string()),
        })
    }

    fn open(path: &str) -> Result<Reader<Vec<u8>>> {
        Reader::open_readfile(path).map_err(|e| {
            GoipError::file_operation(format!("failed to open MaxMind database '{}': {}", path, e))
        })
    }

    pub fn db_path(&self) -> String {
        self.db_path.read().clone()
    }
}

/// 将 GeoIP2 City 记录转换为 GeoRecord
pub(crate) fn record_from_city(ip: &str, city: &geoip2::City<'_>) -> GeoRecord {
    let continent = city.continent.code.map(|code| Continent {
        code: code.to_string(),
        name: city.continent.names.english.unwrap_or_default().to_string(),
    });

    let location = match (city.location.latitude, city.location.longitude) {
        (Some(lat), Some(lon)) => {
            Location::from_coordinates(lat, lon, city.location.time_zone.unwrap_or_default())
        }
        _ => None,
    };

    GeoRecord {
        ip: ip.to_string(),
        country: Country {
            iso_code: city.country.iso_code.unwrap_or_default().to_string(),
            name: city.country.names.english.unwrap_or_default().to_string(),
            name_zh: city
                .country
                .names
                .simplified_chinese
                .unwrap_or_default()
                .to_string(),
        },
        city: City {
            name: city.city.names.english.unwrap_or_default().to_string(),
            name_zh: city
                .city
                .names
                .simplified_chinese
                .unwrap_or_default()
                .to_string(),
            postal_code: city.postal.code.unwrap_or_default().to_string(),
        },
        continent,
        location,
        provider: ProviderKind::MaxMind.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl GeoIpLookup for MaxMindProvider {
    async fn lookup(&self, ip: &str) -> Result<GeoRecord> {
        let ip_addr = parse_ip(ip)?;

        let reader = self
            .reader
            .load_full()
            .ok_or_else(|| GoipError::unavailable("MaxMind database is closed"))?;

        let result = reader
            .lookup(ip_addr)
            .map_err(|e| GoipError::unavailable(format!("MaxMind lookup failed: {}", e)))?;
        let city: Option<geoip2::City> = result
            .decode()
            .map_err(|e| GoipError::unavailable(format!("MaxMind decode failed: {}", e)))?;

        let Some(city) = city else {
            return Err(GoipError::not_found(format!(
                "{} not found in MaxMind database",
                ip
            )));
        };

        let record = record_from_city(ip, &city);
        trace!(
            "MaxMind lookup for {}: country={}, city={}",
            ip, record.country.iso_code, record.city.name
        );
        Ok(record)
    }

    fn kind(&self) -> &str {
        ProviderKind::MaxMind.as_str()
    }

    fn close(&self) -> Result<()> {
        self.reader.store(None);
        Ok(())
    }

    fn reload(&self, path: &str) -> Result<()> {
        // 新文件打开失败时保持旧 reader 不变
        let reader = Self::open(path)?;
        self.reader.store(Some(Arc::new(reader)));
        *self.db_path.write() = path.to_string();
        info!("MaxMind database reloaded from {}", path);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        if self.reader.load().is_some() {
            Ok(())
        } else {
            Err(GoipError::unavailable("MaxMind database is closed"))
        }
    }
}
