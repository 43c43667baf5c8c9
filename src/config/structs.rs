use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::errors::{GoipError, Result};
use crate::models::ProviderKind;
use crate::utils::duration::serde_duration;

/// 配置文件默认路径
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 环境变量前缀：GOIP__SERVER__PORT=9000
pub const ENV_PREFIX: &str = "GOIP";

/// 兼容旧部署的扁平环境变量名 → 配置 key
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("SERVER_HOST", "server.host"),
    ("SERVER_PORT", "server.port"),
    ("SERVER_READ_TIMEOUT", "server.read_timeout"),
    ("SERVER_WRITE_TIMEOUT", "server.write_timeout"),
    ("SERVER_SHUTDOWN_TIMEOUT", "server.shutdown_timeout"),
    ("MAXMIND_DB_PATH", "maxmind.db_path"),
    ("REDIS_HOST", "redis.host"),
    ("REDIS_PORT", "redis.port"),
    ("REDIS_PASSWORD", "redis.password"),
    ("REDIS_DB", "redis.db"),
    ("REDIS_POOL_SIZE", "redis.pool_size"),
    ("REDIS_MIN_IDLE_CONNS", "redis.min_idle_conns"),
    ("REDIS_MAX_RETRIES", "redis.max_retries"),
    ("REDIS_DIAL_TIMEOUT", "redis.dial_timeout"),
    ("REDIS_READ_TIMEOUT", "redis.read_timeout"),
    ("REDIS_WRITE_TIMEOUT", "redis.write_timeout"),
    ("CACHE_ENABLED", "cache.enabled"),
    ("CACHE_TTL", "cache.ttl"),
    ("RATE_LIMIT_ENABLED", "rate_limit.enabled"),
    ("RATE_LIMIT_RPM", "rate_limit.requests_per_minute"),
    ("RATE_LIMIT_RPH", "rate_limit.requests_per_hour"),
    ("RATE_LIMIT_BURST", "rate_limit.burst"),
    ("RATE_LIMIT_STORAGE", "rate_limit.storage"),
    ("BATCH_MAX_SIZE", "batch.max_size"),
    ("LOG_LEVEL", "log.level"),
    ("LOG_FORMAT", "log.format"),
    ("LOG_OUTPUT", "log.file"),
];

/// Provider 的区域标签
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderRegion {
    Cn,
    Global,
    All,
    #[default]
    #[serde(rename = "")]
    #[strum(serialize = "")]
    Unspecified,
}

/// 静态配置（TOML + 环境变量，启动时加载）
///
/// 包含：
/// - server: 监听地址、超时
/// - redis: 共享缓存连接参数
/// - cache / rate_limit / batch: 查询管线参数
/// - log: 日志配置
/// - providers: 有序的 provider 列表
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub maxmind: MaxMindConfig,
    #[serde(default)]
    pub external_api: ExternalApiConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > 配置文件 > 默认值
    /// ENV 前缀：GOIP，分隔符：__
    /// 示例：GOIP__SERVER__PORT=9999，也接受 SERVER_PORT 这类旧变量名
    pub fn load(path: &str) -> Result<Self> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder()
            // 1. 从 TOML 文件加载（可选）
            .add_source(File::with_name(path).required(false))
            // 2. 从环境变量覆盖
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        for (env_name, key) in LEGACY_ENV_KEYS {
            builder = builder.set_override_option(*key, std::env::var(env_name).ok())?;
        }

        let config: StaticConfig = builder.build()?.try_deserialize()?;
        if std::path::Path::new(path).exists() {
            eprintln!("[INFO] Configuration loaded from: {}", path);
        }

        super::validators::validate_config(&config)?;
        Ok(config)
    }

    /// 实际生效的 provider 列表
    ///
    /// 未配置 `providers` 时，`maxmind.db_path` 作为单条目列表使用
    pub fn effective_providers(&self) -> Vec<ProviderConfig> {
        if !self.providers.is_empty() {
            return self.providers.clone();
        }
        match self.maxmind.db_path.as_deref() {
            Some(path) if !path.is_empty() => vec![ProviderConfig {
                kind: ProviderKind::MaxMind,
                db_path: Some(path.to_string()),
                priority: 0,
                region: ProviderRegion::All,
            }],
            _ => Vec::new(),
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let mut sample_config = Self::default();
        sample_config.providers = vec![
            ProviderConfig {
                kind: ProviderKind::MaxMind,
                db_path: Some("./data/GeoLite2-City.mmdb".to_string()),
                priority: 1,
                region: ProviderRegion::Global,
            },
            ProviderConfig {
                kind: ProviderKind::Ipip,
                db_path: Some("./data/ipipfree.ipdb".to_string()),
                priority: 2,
                region: ProviderRegion::Cn,
            },
            ProviderConfig {
                kind: ProviderKind::IpApi,
                db_path: None,
                priority: 10,
                region: ProviderRegion::All,
            },
        ];
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GoipError::serialization(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_io_timeout", with = "serde_duration")]
    pub read_timeout: Duration,
    #[serde(default = "default_io_timeout", with = "serde_duration")]
    pub write_timeout: Duration,
    #[serde(default = "default_shutdown_timeout", with = "serde_duration")]
    pub shutdown_timeout: Duration,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Redis 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: i64,
    /// 使用 rediss:// 连接
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_min_idle_conns")]
    pub min_idle_conns: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_dial_timeout", with = "serde_duration")]
    pub dial_timeout: Duration,
    #[serde(default = "default_redis_op_timeout", with = "serde_duration")]
    pub read_timeout: Duration,
    #[serde(default = "default_redis_op_timeout", with = "serde_duration")]
    pub write_timeout: Duration,
}

impl RedisConfig {
    /// 拼接连接 URL，密码做 URL 编码
    pub fn url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        if self.password.is_empty() {
            format!("{}://{}:{}/{}", scheme, self.host, self.port, self.db)
        } else {
            format!(
                "{}://:{}@{}:{}/{}",
                scheme,
                urlencoding::encode(&self.password),
                self.host,
                self.port,
                self.db
            )
        }
    }
}

/// 查询结果缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// redis | memory
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    #[serde(default = "default_cache_ttl", with = "serde_duration")]
    pub ttl: Duration,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: u64,
}

/// 限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    #[serde(default = "default_rph")]
    pub requests_per_hour: u32,
    /// 兼容旧配置保留，不参与放行判定（两个窗口都按各自上限计数）
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// redis | memory
    #[serde(default = "default_rate_limit_storage")]
    pub storage: String,
}

/// 批量查询配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// json | text（console 视为 text）
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_true")]
    pub enable_rotation: bool,
}

/// 单 provider 旧式配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxMindConfig {
    #[serde(default = "default_maxmind_db_path")]
    pub db_path: Option<String>,
}

/// 外部 API provider 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalApiConfig {
    #[serde(default = "default_external_api_timeout", with = "serde_duration")]
    pub timeout: Duration,
}

/// provider 列表条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub region: ProviderRegion,
}

// ============================================================
// Default value functions
// ============================================================

fn default_true() -> bool {
    true
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_io_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_pool_size() -> usize {
    10
}

fn default_min_idle_conns() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_redis_op_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_cache_backend() -> String {
    "redis".to_string()
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_memory_capacity() -> u64 {
    100_000
}

fn default_rpm() -> u32 {
    100
}

fn default_rph() -> u32 {
    5000
}

fn default_burst() -> u32 {
    10
}

fn default_rate_limit_storage() -> String {
    "redis".to_string()
}

fn default_batch_max_size() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_maxmind_db_path() -> Option<String> {
    Some("./data/GeoLite2-Country.mmdb".to_string())
}

fn default_external_api_timeout() -> Duration {
    Duration::from_secs(5)
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            read_timeout: default_io_timeout(),
            write_timeout: default_io_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            workers: default_workers(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: String::new(),
            db: 0,
            tls: false,
            pool_size: default_pool_size(),
            min_idle_conns: default_min_idle_conns(),
            max_retries: default_max_retries(),
            dial_timeout: default_dial_timeout(),
            read_timeout: default_redis_op_timeout(),
            write_timeout: default_redis_op_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_cache_backend(),
            ttl: default_cache_ttl(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: default_rpm(),
            requests_per_hour: default_rph(),
            burst: default_burst(),
            storage: default_rate_limit_storage(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: true,
        }
    }
}

impl Default for MaxMindConfig {
    fn default() -> Self {
        Self {
            db_path: default_maxmind_db_path(),
        }
    }
}

impl Default for ExternalApiConfig {
    fn default() -> Self {
        Self {
            timeout: default_external_api_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StaticConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.redis.pool_size, 10);
        assert_eq!(config.cache.ttl, Duration::from_secs(86400));
        assert_eq!(config.rate_limit.requests_per_minute, 100);
        assert_eq!(config.rate_limit.requests_per_hour, 5000);
        assert_eq!(config.batch.max_size, 100);
        assert_eq!(config.external_api.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_legacy_maxmind_path_becomes_single_provider() {
        let config = StaticConfig::default();
        let providers = config.effective_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].kind, ProviderKind::MaxMind);
        assert_eq!(
            providers[0].db_path.as_deref(),
            Some("./data/GeoLite2-Country.mmdb")
        );

        let mut config = StaticConfig::default();
        config.maxmind.db_path = None;
        assert!(config.effective_providers().is_empty());
    }

    #[test]
    fn test_providers_list_overrides_legacy_path() {
        let toml_src = r#"
            [cache]
            ttl = "12h"

            [[providers]]
            kind = "ipip"
            db_path = "/data/city.ipdb"
            priority = 2
            region = "cn"

            [[providers]]
            kind = "ipapi.co"
            priority = 5
        "#;
        let config: StaticConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.cache.ttl, Duration::from_secs(12 * 3600));

        let providers = config.effective_providers();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].kind, ProviderKind::Ipip);
        assert_eq!(providers[0].region, ProviderRegion::Cn);
        assert_eq!(providers[1].kind, ProviderKind::IpApiCo);
        assert_eq!(providers[1].region, ProviderRegion::Unspecified);
    }

    #[test]
    fn test_redis_url() {
        let mut redis = RedisConfig::default();
        assert_eq!(redis.url(), "redis://localhost:6379/0");

        redis.password = "p@ss word".to_string();
        redis.db = 2;
        redis.tls = true;
        assert_eq!(redis.url(), "rediss://:p%40ss%20word@localhost:6379/2");
    }

    #[test]
    fn test_sample_config_parses_back() {
        let sample = StaticConfig::generate_sample_config();
        let parsed: StaticConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.providers.len(), 3);
        assert_eq!(parsed.server.port, 8080);
    }
}
