//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    /// 未设置时使用内存存储。
    pub database_url: Option<String>,
    pub preview_rows: usize,
    pub mqtt_timeout_ms: u64,
    pub history_default_limit: u64,
    pub history_max_limit: u64,
    pub duplicate_max: u32,
    pub upload_max_bytes: usize,
    pub rearm_on_start: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr =
            env::var("DEVSIM_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let database_url = read_optional("DEVSIM_DATABASE_URL");
        let preview_rows = read_u64_with_default("DEVSIM_PREVIEW_ROWS", 5)?;
        let mqtt_timeout_ms = read_u64_with_default("DEVSIM_MQTT_TIMEOUT_MS", 10_000)?;
        let history_default_limit = read_u64_with_default("DEVSIM_HISTORY_DEFAULT_LIMIT", 10)?;
        let history_max_limit = read_u64_with_default("DEVSIM_HISTORY_MAX_LIMIT", 100)?;
        let duplicate_max = read_u32_with_default("DEVSIM_DUPLICATE_MAX", 50)?;
        let upload_max_bytes = read_u64_with_default("DEVSIM_UPLOAD_MAX_BYTES", 10 * 1024 * 1024)?;
        let rearm_on_start = read_bool_with_default("DEVSIM_REARM_ON_START", true);

        if preview_rows == 0 {
            return Err(ConfigError::Invalid(
                "DEVSIM_PREVIEW_ROWS".to_string(),
                preview_rows.to_string(),
            ));
        }
        if history_default_limit == 0 || history_default_limit > history_max_limit {
            return Err(ConfigError::Invalid(
                "DEVSIM_HISTORY_DEFAULT_LIMIT".to_string(),
                history_default_limit.to_string(),
            ));
        }

        Ok(Self {
            http_addr,
            database_url,
            preview_rows: preview_rows as usize,
            mqtt_timeout_ms,
            history_default_limit,
            history_max_limit,
            duplicate_max,
            upload_max_bytes: upload_max_bytes as usize,
            rearm_on_start,
        })
    }
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
