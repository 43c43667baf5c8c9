//! 时长解析
//!
//! 配置中的超时与 TTL 支持两种写法：
//! - 纯数字：按秒处理（`86400`）
//! - 带单位：`500ms`, `10s`, `5m`, `24h`, `1d`, 以及组合 `1h30m`

use std::time::Duration;

/// 解析时长字符串
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("时长不能为空".to_string());
    }

    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut remaining = input;

    while !remaining.is_empty() {
        let digits = remaining
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(remaining.len());
        if digits == 0 {
            return Err(format!("无效的时长格式: '{}'", input));
        }
        let num: u64 = remaining[..digits]
            .parse()
            .map_err(|_| format!("无效的数字: '{}'", &remaining[..digits]))?;
        remaining = &remaining[digits..];

        let unit_len = remaining
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(remaining.len());
        if unit_len == 0 {
            return Err(format!("缺少时间单位，数字 '{}' 后应跟时间单位", num));
        }
        let unit = &remaining[..unit_len];
        remaining = &remaining[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(num),
            "s" | "sec" => Duration::from_secs(num),
            "m" | "min" => Duration::from_secs(num * 60),
            "h" => Duration::from_secs(num * 3600),
            "d" => Duration::from_secs(num * 86400),
            _ => return Err(format!("不支持的时间单位: '{}'", unit)),
        };
        total += part;
    }

    Ok(total)
}

/// 格式化为配置文件中的写法
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// serde 适配：`#[serde(with = "crate::utils::duration::serde_duration")]`
pub mod serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(de::Error::custom),
        }
    }
}
