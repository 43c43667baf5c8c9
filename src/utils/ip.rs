//! IP 地址处理工具
//!
//! - 查询参数校验（IPv4 / IPv6）
//! - 私有地址判断
//! - 客户端 IP 提取（限流 key 使用）

use std::net::{IpAddr, SocketAddr};

use actix_web::dev::ConnectionInfo;
use actix_web::http::header::HeaderMap;
use tracing::debug;

use crate::errors::{GoipError, Result};

/// 私有、回环与链路本地网段
const PRIVATE_RANGES: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "::1/128",
    "fc00::/7",
    "fe80::/10",
];

/// 解析查询的 IP，失败返回 `InvalidIp`
pub fn parse_ip(ip: &str) -> Result<IpAddr> {
    ip.parse::<IpAddr>()
        .map_err(|_| GoipError::invalid_ip(format!("invalid IP address: {}", ip)))
}

pub fn is_valid_ip(ip: &str) -> bool {
    ip.parse::<IpAddr>().is_ok()
}

/// 检查 IP 是否为私有地址或 localhost
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    PRIVATE_RANGES.iter().any(|cidr| ip_in_cidr(ip, cidr))
}

/// CIDR 检查
pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix_len)) = cidr.split_once('/') else {
        return false;
    };

    let Ok(prefix_len): std::result::Result<u8, _> = prefix_len.parse() else {
        return false;
    };

    let Ok(network_addr) = network.parse::<IpAddr>() else {
        return false;
    };

    match (ip, network_addr) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            if prefix_len > 32 {
                return false;
            }
            let mask = u32::MAX.checked_shl(32 - prefix_len as u32).unwrap_or(0);
            let ip_bits = u32::from_be_bytes(ip.octets());
            let net_bits = u32::from_be_bytes(net.octets());
            (ip_bits & mask) == (net_bits & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            if prefix_len > 128 {
                return false;
            }
            let mask = u128::MAX.checked_shl(128 - prefix_len as u32).unwrap_or(0);
            let ip_bits = u128::from_be_bytes(ip.octets());
            let net_bits = u128::from_be_bytes(net.octets());
            (ip_bits & mask) == (net_bits & mask)
        }
        _ => false, // IPv4 vs IPv6 不匹配
    }
}

/// 从 ConnectionInfo 提取真实客户端 IP
///
/// 连接来自私有地址（反向代理）时使用 X-Forwarded-For / X-Real-IP，
/// 公网直连时使用连接 IP，防止伪造。
pub fn extract_client_ip(conn_info: &ConnectionInfo, headers: &HeaderMap) -> Option<String> {
    let peer = conn_info.peer_addr()?;

    let peer_ip = if let Ok(socket_addr) = peer.parse::<SocketAddr>() {
        Some(socket_addr.ip())
    } else {
        peer.parse::<IpAddr>().ok()
    };

    if let Some(ip) = peer_ip
        && is_private_or_local(&ip)
        && let Some(real_ip) = extract_forwarded_ip_from_headers(headers)
    {
        debug!("Proxy detected (private peer {}): using {}", peer, real_ip);
        return Some(real_ip);
    }

    Some(peer_ip.map(|ip| ip.to_string()).unwrap_or_else(|| peer.to_string()))
}

/// 从 HeaderMap 提取转发的 IP
pub fn extract_forwarded_ip_from_headers(headers: &HeaderMap) -> Option<String> {
    // 优先 X-Forwarded-For（取第一个，即原始客户端 IP）
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
}
