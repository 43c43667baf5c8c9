//! 响应构造帮助函数
//!
//! 所有错误响应共用 `{error, code, timestamp}` 结构。

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::LookupOutcome;
use crate::errors::GoipError;
use crate::models::GeoRecord;

/// 统一错误响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

pub fn error_body(message: impl Into<String>, code: impl Into<String>) -> ErrorResponse {
    ErrorResponse {
        error: message.into(),
        code: code.into(),
        timestamp: Utc::now(),
    }
}

/// 构建 JSON 响应
pub fn json_response<T: Serialize>(status: StatusCode, data: &T) -> HttpResponse {
    HttpResponse::build(status)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(data)
}

/// 构建错误响应
pub fn error_response(status: StatusCode, code: &str, message: &str) -> HttpResponse {
    json_response(status, &error_body(message, code))
}

/// 从 GoipError 构建错误响应（自动映射 HTTP 状态码和 API 错误码）
pub fn error_from_goip(err: &GoipError) -> HttpResponse {
    error_response(err.http_status(), err.api_code(), err.message())
}

/// 返回查询结果，并把 provider / source 交给访问日志
pub fn record_response(record: &GeoRecord) -> HttpResponse {
    let mut response = json_response(StatusCode::OK, record);
    response.extensions_mut().insert(LookupOutcome {
        provider: record.provider.clone(),
        source: record
            .source
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string()),
    });
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let value = serde_json::to_value(error_body("bad ip", "INVALID_IP")).unwrap();
        assert_eq!(value["error"], "bad ip");
        assert_eq!(value["code"], "INVALID_IP");
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_error_from_goip_status() {
        let resp = error_from_goip(&GoipError::unavailable("IPIP database is closed"));
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let resp = error_from_goip(&GoipError::not_found("no record"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
