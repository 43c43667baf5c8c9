//! GeoIP 服务模块
//!
//! 提供 IP 地址地理位置查询功能，支持：
//! - MaxMind GeoLite2 本地数据库
//! - IPIP.NET 本地数据库（中文数据）
//! - 外部 API（ip-api.com / ipinfo.io / ipapi.co）
//!
//! 多个 provider 由 `MultiProviderResolver` 组合，按国家路由并做完整性回退。

mod external_api;
pub mod ipdb;
mod ipip;
mod maxmind;
mod provider;
mod resolver;

pub use external_api::{
    ExternalApiProvider, MAX_HTTP_TIMEOUT, Vendor, parse_ip_api, parse_ipapi_co, parse_ipinfo,
};
pub use ipip::IpipProvider;
pub use maxmind::MaxMindProvider;
pub use provider::{GeoIpLookup, build_provider};
pub use resolver::{MultiProviderResolver, ProviderEntry, ProviderHealth};
