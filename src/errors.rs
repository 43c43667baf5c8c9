use std::fmt;

use actix_web::http::StatusCode;

#[derive(Debug, Clone)]
pub enum GoipError {
    InvalidIp(String),
    NotFound(String),
    Unavailable(String),
    ProviderTransport(String),
    ProviderNotFound(String),
    AllFailed(String),
    NoProviders(String),
    CacheStore(String),
    Serialization(String),
    Config(String),
    Validation(String),
    RateLimited(String),
    FileOperation(String),
}

impl GoipError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            GoipError::InvalidIp(_) => "E001",
            GoipError::NotFound(_) => "E002",
            GoipError::Unavailable(_) => "E003",
            GoipError::ProviderTransport(_) => "E004",
            GoipError::ProviderNotFound(_) => "E005",
            GoipError::AllFailed(_) => "E006",
            GoipError::NoProviders(_) => "E007",
            GoipError::CacheStore(_) => "E008",
            GoipError::Serialization(_) => "E009",
            GoipError::Config(_) => "E010",
            GoipError::Validation(_) => "E011",
            GoipError::RateLimited(_) => "E012",
            GoipError::FileOperation(_) => "E013",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            GoipError::InvalidIp(_) => "Invalid IP Address",
            GoipError::NotFound(_) => "IP Not Found",
            GoipError::Unavailable(_) => "Provider Unavailable",
            GoipError::ProviderTransport(_) => "Provider Transport Error",
            GoipError::ProviderNotFound(_) => "Provider Not Found",
            GoipError::AllFailed(_) => "All Providers Failed",
            GoipError::NoProviders(_) => "No Providers Configured",
            GoipError::CacheStore(_) => "Cache Store Error",
            GoipError::Serialization(_) => "Serialization Error",
            GoipError::Config(_) => "Configuration Error",
            GoipError::Validation(_) => "Validation Error",
            GoipError::RateLimited(_) => "Rate Limit Exceeded",
            GoipError::FileOperation(_) => "File Operation Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            GoipError::InvalidIp(msg)
            | GoipError::NotFound(msg)
            | GoipError::Unavailable(msg)
            | GoipError::ProviderTransport(msg)
            | GoipError::ProviderNotFound(msg)
            | GoipError::AllFailed(msg)
            | GoipError::NoProviders(msg)
            | GoipError::CacheStore(msg)
            | GoipError::Serialization(msg)
            | GoipError::Config(msg)
            | GoipError::Validation(msg)
            | GoipError::RateLimited(msg)
            | GoipError::FileOperation(msg) => msg,
        }
    }

    /// 对外暴露的 API 错误码（响应体中的 `code` 字段）
    pub fn api_code(&self) -> &'static str {
        match self {
            GoipError::InvalidIp(_) => "INVALID_IP",
            GoipError::NotFound(_) => "IP_NOT_FOUND",
            GoipError::Unavailable(_) => "DB_ERROR",
            GoipError::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            GoipError::Validation(_) => "INVALID_REQUEST",
            GoipError::RateLimited(_) => "RATE_LIMIT_EXCEEDED",
            GoipError::CacheStore(_) => "CACHE_ERROR",
            GoipError::ProviderTransport(_)
            | GoipError::AllFailed(_)
            | GoipError::NoProviders(_)
            | GoipError::Serialization(_)
            | GoipError::Config(_)
            | GoipError::FileOperation(_) => "INTERNAL_ERROR",
        }
    }

    /// 映射到 HTTP 状态码
    pub fn http_status(&self) -> StatusCode {
        match self {
            GoipError::InvalidIp(_) | GoipError::Validation(_) => StatusCode::BAD_REQUEST,
            GoipError::NotFound(_) | GoipError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            GoipError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GoipError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 格式化为彩色输出（用于启动失败时的终端提示）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GoipError::NotFound(_))
    }
}

impl fmt::Display for GoipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for GoipError {}

// 便捷的构造函数
impl GoipError {
    pub fn invalid_ip<T: Into<String>>(msg: T) -> Self {
        GoipError::InvalidIp(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        GoipError::NotFound(msg.into())
    }

    pub fn unavailable<T: Into<String>>(msg: T) -> Self {
        GoipError::Unavailable(msg.into())
    }

    pub fn provider_transport<T: Into<String>>(msg: T) -> Self {
        GoipError::ProviderTransport(msg.into())
    }

    pub fn provider_not_found<T: Into<String>>(msg: T) -> Self {
        GoipError::ProviderNotFound(msg.into())
    }

    pub fn all_failed<T: Into<String>>(msg: T) -> Self {
        GoipError::AllFailed(msg.into())
    }

    pub fn no_providers<T: Into<String>>(msg: T) -> Self {
        GoipError::NoProviders(msg.into())
    }

    pub fn cache_store<T: Into<String>>(msg: T) -> Self {
        GoipError::CacheStore(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        GoipError::Serialization(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        GoipError::Config(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        GoipError::Validation(msg.into())
    }

    pub fn rate_limited<T: Into<String>>(msg: T) -> Self {
        GoipError::RateLimited(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        GoipError::FileOperation(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<std::io::Error> for GoipError {
    fn from(err: std::io::Error) -> Self {
        GoipError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for GoipError {
    fn from(err: serde_json::Error) -> Self {
        GoipError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for GoipError {
    fn from(err: redis::RedisError) -> Self {
        GoipError::CacheStore(err.to_string())
    }
}

impl From<maxminddb::MaxMindDbError> for GoipError {
    fn from(err: maxminddb::MaxMindDbError) -> Self {
        GoipError::Unavailable(err.to_string())
    }
}

impl From<config::ConfigError> for GoipError {
    fn from(err: config::ConfigError) -> Self {
        GoipError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GoipError>;
