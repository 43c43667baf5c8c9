//! IPDB 格式读取器（IPIP.NET 数据库）
//!
//! 文件结构：
//! - 4 字节大端 meta 长度
//! - JSON meta（node_count / total_size / languages / fields / ip_version）
//! - 二叉树节点区，每个节点 8 字节（左右子节点各 4 字节大端）
//! - 记录区，每条记录 2 字节长度 + 以 `\t` 分隔的字段
//!
//! 同一条记录包含所有语言的字段，`languages` 给出每种语言的起始偏移。

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{GoipError, Result};

const IPV4_FLAG: u16 = 0x01;
const IPV6_FLAG: u16 = 0x02;

/// 数据库 meta 信息
#[derive(Debug, Clone, Deserialize)]
pub struct IpdbMeta {
    #[serde(default)]
    pub build: i64,
    pub ip_version: u16,
    pub languages: HashMap<String, usize>,
    pub node_count: usize,
    pub total_size: usize,
    pub fields: Vec<String>,
}

/// 只读 IPDB 数据库，加载后可被多线程并发查询
#[derive(Debug)]
pub struct IpdbReader {
    meta: IpdbMeta,
    data: Vec<u8>,
    v4_offset: usize,
}

impl IpdbReader {
    /// 从文件加载
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            GoipError::file_operation(format!(
                "failed to read ipdb file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_bytes(bytes)
    }

    /// 从内存数据加载
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(GoipError::file_operation("ipdb: file too short"));
        }
        let meta_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let Some(meta_bytes) = bytes.get(4..4 + meta_len) else {
            return Err(GoipError::file_operation("ipdb: meta length out of range"));
        };

        let meta: IpdbMeta = serde_json::from_slice(meta_bytes)
            .map_err(|e| GoipError::file_operation(format!("ipdb: invalid meta: {}", e)))?;
        if meta.languages.is_empty() || meta.fields.is_empty() {
            return Err(GoipError::file_operation("ipdb: meta has no languages or fields"));
        }

        let data = bytes[4 + meta_len..].to_vec();
        if data.len() != meta.total_size {
            return Err(GoipError::file_operation(format!(
                "ipdb: database size mismatch (expected {}, got {})",
                meta.total_size,
                data.len()
            )));
        }

        let mut reader = Self {
            meta,
            data,
            v4_offset: 0,
        };

        // IPv4 映射在 ::ffff:0:0/96 下，先走完前 96 位
        let mut node = 0;
        for i in 0..96 {
            if node >= reader.meta.node_count {
                break;
            }
            node = reader.read_node(node, if i >= 80 { 1 } else { 0 })?;
        }
        reader.v4_offset = node;

        Ok(reader)
    }

    pub fn meta(&self) -> &IpdbMeta {
        &self.meta
    }

    pub fn is_ipv4_supported(&self) -> bool {
        self.meta.ip_version & IPV4_FLAG == IPV4_FLAG
    }

    pub fn is_ipv6_supported(&self) -> bool {
        self.meta.ip_version & IPV6_FLAG == IPV6_FLAG
    }

    pub fn languages(&self) -> Vec<&str> {
        self.meta.languages.keys().map(String::as_str).collect()
    }

    /// 查询 IP，返回该语言下按 `fields` 顺序排列的值；未收录返回 `None`
    pub fn find(&self, ip: IpAddr, language: &str) -> Result<Option<Vec<String>>> {
        let Some(&offset) = self.meta.languages.get(language) else {
            return Err(GoipError::validation(format!(
                "ipdb: language '{}' not supported",
                language
            )));
        };

        let Some(node) = self.search(ip)? else {
            return Ok(None);
        };

        let body = self.resolve(node)?;
        let parts: Vec<&str> = body.split('\t').collect();
        let field_count = self.meta.fields.len();
        if offset + field_count > parts.len() {
            return Err(GoipError::unavailable("ipdb: database is broken"));
        }

        Ok(Some(
            parts[offset..offset + field_count]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ))
    }

    /// 同 `find`，以字段名为 key 返回
    pub fn find_map(&self, ip: IpAddr, language: &str) -> Result<Option<HashMap<String, String>>> {
        Ok(self.find(ip, language)?.map(|values| {
            self.meta
                .fields
                .iter()
                .cloned()
                .zip(values)
                .collect::<HashMap<_, _>>()
        }))
    }

    fn search(&self, ip: IpAddr) -> Result<Option<usize>> {
        let (octets, mut node): (Vec<u8>, usize) = match ip {
            IpAddr::V4(v4) => {
                if !self.is_ipv4_supported() {
                    return Ok(None);
                }
                (v4.octets().to_vec(), self.v4_offset)
            }
            IpAddr::V6(v6) => {
                if !self.is_ipv6_supported() {
                    return Ok(None);
                }
                (v6.octets().to_vec(), 0)
            }
        };

        let bit_count = octets.len() * 8;
        for i in 0..bit_count {
            if node > self.meta.node_count {
                break;
            }
            let bit = (octets[i >> 3] >> (7 - (i % 8))) & 1;
            node = self.read_node(node, bit as usize)?;
        }

        if node > self.meta.node_count {
            Ok(Some(node))
        } else {
            Ok(None)
        }
    }

    fn read_node(&self, node: usize, index: usize) -> Result<usize> {
        let off = node * 8 + index * 4;
        let Some(bytes) = self.data.get(off..off + 4) else {
            return Err(GoipError::unavailable("ipdb: node index out of range"));
        };
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }

    fn resolve(&self, node: usize) -> Result<&str> {
        let resolved = node - self.meta.node_count + self.meta.node_count * 8;
        let Some(len_bytes) = self.data.get(resolved..resolved + 2) else {
            return Err(GoipError::unavailable("ipdb: record offset out of range"));
        };
        let size = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;

        let Some(body) = self.data.get(resolved + 2..resolved + 2 + size) else {
            return Err(GoipError::unavailable("ipdb: record length out of range"));
        };
        std::str::from_utf8(body).map_err(|_| GoipError::unavailable("ipdb: record is not valid UTF-8"))
    }
}

/// 测试用的最小 IPDB 文件
///
/// 仅支持 IPv4：末位为 0 的地址命中 `record`，末位为 1 的地址未收录。
#[cfg(test)]
pub(crate) mod fixture {
    pub const NODE_COUNT: u32 = 128;

    pub fn build(fields: &[&str], record: &str) -> Vec<u8> {
        let mut tree = Vec::with_capacity(NODE_COUNT as usize * 8);
        for node in 0..NODE_COUNT {
            let (left, right) = if node < NODE_COUNT - 1 {
                (node + 1, node + 1)
            } else {
                (NODE_COUNT + 1, NODE_COUNT)
            };
            tree.extend_from_slice(&left.to_be_bytes());
            tree.extend_from_slice(&right.to_be_bytes());
        }

        let mut data = tree;
        // node_count + 1 指向树区之后第 1 字节
        data.push(0);
        data.extend_from_slice(&(record.len() as u16).to_be_bytes());
        data.extend_from_slice(record.as_bytes());

        let meta = serde_json::json!({
            "build": 1_700_000_000,
            "ip_version": 1,
            "languages": {"CN": 0},
            "node_count": NODE_COUNT,
            "total_size": data.len(),
            "fields": fields,
        })
        .to_string();

        let mut out = Vec::new();
        out.extend_from_slice(&(meta.len() as u32).to_be_bytes());
        out.extend_from_slice(meta.as_bytes());
        out.extend_from_slice(&data);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> IpdbReader {
        let bytes = fixture::build(
            &["country_name", "region_name", "city_name"],
            "中国\t广东\t深圳",
        );
        IpdbReader::from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_meta_and_support_flags() {
        let reader = reader();
        assert!(reader.is_ipv4_supported());
        assert!(!reader.is_ipv6_supported());
        assert_eq!(reader.meta().node_count, 128);
        assert_eq!(reader.languages(), vec!["CN"]);
    }

    #[test]
    fn test_find_hit() {
        let reader = reader();
        let values = reader.find("114.114.114.114".parse().unwrap(), "CN").unwrap();
        assert_eq!(
            values,
            Some(vec![
                "中国".to_string(),
                "广东".to_string(),
                "深圳".to_string()
            ])
        );

        let map = reader
            .find_map("1.2.3.4".parse().unwrap(), "CN")
            .unwrap()
            .unwrap();
        assert_eq!(map.get("city_name").map(String::as_str), Some("深圳"));
    }

    #[test]
    fn test_find_miss() {
        let reader = reader();
        assert_eq!(reader.find("1.2.3.5".parse().unwrap(), "CN").unwrap(), None);
        // IPv4-only 数据库不支持 IPv6
        assert_eq!(reader.find("2001:db8::2".parse().unwrap(), "CN").unwrap(), None);
    }

    #[test]
    fn test_unknown_language() {
        let reader = reader();
        assert!(matches!(
            reader.find("1.2.3.4".parse().unwrap(), "EN"),
            Err(GoipError::Validation(_))
        ));
    }

    #[test]
    fn test_broken_record() {
        // 记录字段数少于 meta.fields
        let bytes = fixture::build(&["country_name", "region_name", "city_name"], "中国");
        let reader = IpdbReader::from_bytes(bytes).unwrap();
        assert!(matches!(
            reader.find("1.2.3.4".parse().unwrap(), "CN"),
            Err(GoipError::Unavailable(_))
        ));
    }

    #[test]
    fn test_rejects_corrupt_files() {
        assert!(IpdbReader::from_bytes(vec![0, 0]).is_err());
        assert!(IpdbReader::from_bytes(vec![0, 0, 0, 10, b'{']).is_err());

        let mut bytes = fixture::build(&["country_name"], "中国");
        bytes.pop();
        assert!(IpdbReader::from_bytes(bytes).is_err());
    }
}
