//! 连接配置：按 `type` / `auth_type` 判别的和类型，在边界处逐变体校验。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const MASK: &str = "***";

/// 连接配置校验错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConfigValidationError(pub String);

impl ConfigValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// 连接类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    #[serde(rename = "MQTT")]
    Mqtt,
    #[serde(rename = "HTTPS")]
    Https,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Mqtt => "MQTT",
            ConnectionKind::Https => "HTTPS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MQTT" => Some(ConnectionKind::Mqtt),
            "HTTPS" => Some(ConnectionKind::Https),
            _ => None,
        }
    }
}

/// 认证类型判别值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    None,
    UserPass,
    Token,
    ApiKey,
}

impl AuthKind {
    pub const ALL: [AuthKind; 4] = [
        AuthKind::None,
        AuthKind::UserPass,
        AuthKind::Token,
        AuthKind::ApiKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthKind::None => "NONE",
            AuthKind::UserPass => "USER_PASS",
            AuthKind::Token => "TOKEN",
            AuthKind::ApiKey => "API_KEY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NONE" => Some(AuthKind::None),
            "USER_PASS" => Some(AuthKind::UserPass),
            "TOKEN" => Some(AuthKind::Token),
            "API_KEY" => Some(AuthKind::ApiKey),
            _ => None,
        }
    }
}

/// API key 的放置位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// 认证配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthConfig {
    None,
    UserPass {
        username: String,
        password: String,
    },
    Token {
        token: String,
        token_type: String,
    },
    ApiKey {
        key: String,
        location: ApiKeyLocation,
        parameter_name: String,
    },
}

#[derive(Deserialize)]
struct UserPassFields {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct TokenFields {
    #[serde(default)]
    token: String,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Deserialize)]
struct ApiKeyFields {
    #[serde(default, alias = "api_key")]
    key: String,
    #[serde(default)]
    location: Option<ApiKeyLocation>,
    #[serde(default, alias = "header_name")]
    parameter_name: Option<String>,
}

impl AuthConfig {
    pub fn kind(&self) -> AuthKind {
        match self {
            AuthConfig::None => AuthKind::None,
            AuthConfig::UserPass { .. } => AuthKind::UserPass,
            AuthConfig::Token { .. } => AuthKind::Token,
            AuthConfig::ApiKey { .. } => AuthKind::ApiKey,
        }
    }

    /// 按 `auth_type` 解析 `auth_config`，并校验该变体的必填字段。
    pub fn from_parts(auth_type: &str, config: Option<&Value>) -> Result<Self, ConfigValidationError> {
        let kind = AuthKind::parse(auth_type)
            .ok_or_else(|| ConfigValidationError::new(format!("unsupported auth_type: {auth_type}")))?;
        let config = config.cloned().unwrap_or_else(|| json!({}));
        match kind {
            AuthKind::None => Ok(AuthConfig::None),
            AuthKind::UserPass => {
                let fields: UserPassFields = parse_fields(config, "auth_config")?;
                let username = require_text(fields.username, "username")?;
                let password = require_text(fields.password, "password")?;
                Ok(AuthConfig::UserPass { username, password })
            }
            AuthKind::Token => {
                let fields: TokenFields = parse_fields(config, "auth_config")?;
                let token = require_text(fields.token, "token")?;
                let token_type = fields
                    .token_type
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .unwrap_or_else(|| "Bearer".to_string());
                Ok(AuthConfig::Token { token, token_type })
            }
            AuthKind::ApiKey => {
                let fields: ApiKeyFields = parse_fields(config, "auth_config")?;
                let key = require_text(fields.key, "key")?;
                let parameter_name = fields
                    .parameter_name
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .unwrap_or_else(|| "X-API-Key".to_string());
                Ok(AuthConfig::ApiKey {
                    key,
                    location: fields.location.unwrap_or_default(),
                    parameter_name,
                })
            }
        }
    }

    /// 对外展示的配置，敏感字段以掩码替代。
    pub fn masked(&self) -> Value {
        match self {
            AuthConfig::None => json!({}),
            AuthConfig::UserPass { username, .. } => json!({
                "username": username,
                "password": MASK,
            }),
            AuthConfig::Token { token_type, .. } => json!({
                "token": MASK,
                "token_type": token_type,
            }),
            AuthConfig::ApiKey {
                location,
                parameter_name,
                ..
            } => json!({
                "key": MASK,
                "location": location,
                "parameter_name": parameter_name,
            }),
        }
    }
}

/// MQTT 连接参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttSettings {
    pub client_id: Option<String>,
    pub keep_alive: u16,
    pub qos: u8,
    pub retain: bool,
    pub tls: bool,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            keep_alive: 60,
            qos: 1,
            retain: false,
            tls: false,
        }
    }
}

/// HTTP 方法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }
}

/// HTTPS 连接参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpsSettings {
    pub method: HttpMethod,
    pub timeout_seconds: u64,
    pub verify_tls: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpsSettings {
    fn default() -> Self {
        Self {
            method: HttpMethod::Post,
            timeout_seconds: 30,
            verify_tls: true,
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize)]
struct MqttFields {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    keep_alive: Option<u64>,
    #[serde(default)]
    qos: Option<u64>,
    #[serde(default)]
    retain: Option<bool>,
    #[serde(default, alias = "use_tls", alias = "ssl")]
    tls: Option<bool>,
}

#[derive(Deserialize)]
struct HttpsFields {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default, alias = "verify_ssl")]
    verify_tls: Option<bool>,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
}

/// 连接参数：变体由连接类型决定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionSettings {
    Mqtt(MqttSettings),
    Https(HttpsSettings),
}

impl ConnectionSettings {
    pub fn kind(&self) -> ConnectionKind {
        match self {
            ConnectionSettings::Mqtt(_) => ConnectionKind::Mqtt,
            ConnectionSettings::Https(_) => ConnectionKind::Https,
        }
    }

    /// 按连接类型解析 `connection_config`，缺省字段取默认值。
    pub fn from_parts(kind: ConnectionKind, config: Option<&Value>) -> Result<Self, ConfigValidationError> {
        let config = config.cloned().unwrap_or_else(|| json!({}));
        match kind {
            ConnectionKind::Mqtt => {
                let fields: MqttFields = parse_fields(config, "connection_config")?;
                let defaults = MqttSettings::default();
                let qos = fields.qos.unwrap_or(u64::from(defaults.qos));
                if qos > 2 {
                    return Err(ConfigValidationError::new("qos must be 0, 1 or 2"));
                }
                let keep_alive = fields.keep_alive.unwrap_or(u64::from(defaults.keep_alive));
                if keep_alive == 0 || keep_alive > u64::from(u16::MAX) {
                    return Err(ConfigValidationError::new(
                        "keep_alive must be between 1 and 65535 seconds",
                    ));
                }
                Ok(ConnectionSettings::Mqtt(MqttSettings {
                    client_id: fields
                        .client_id
                        .map(|value| value.trim().to_string())
                        .filter(|value| !value.is_empty()),
                    keep_alive: keep_alive as u16,
                    qos: qos as u8,
                    retain: fields.retain.unwrap_or(defaults.retain),
                    tls: fields.tls.unwrap_or(defaults.tls),
                }))
            }
            ConnectionKind::Https => {
                let fields: HttpsFields = parse_fields(config, "connection_config")?;
                let defaults = HttpsSettings::default();
                let method = match fields.method {
                    Some(value) => HttpMethod::parse(&value).ok_or_else(|| {
                        ConfigValidationError::new(format!("unsupported method: {value}"))
                    })?,
                    None => defaults.method,
                };
                let timeout_seconds = fields.timeout.unwrap_or(defaults.timeout_seconds);
                if !(1..=300).contains(&timeout_seconds) {
                    return Err(ConfigValidationError::new(
                        "timeout must be between 1 and 300 seconds",
                    ));
                }
                Ok(ConnectionSettings::Https(HttpsSettings {
                    method,
                    timeout_seconds,
                    verify_tls: fields.verify_tls.unwrap_or(defaults.verify_tls),
                    headers: fields.headers.unwrap_or_default(),
                }))
            }
        }
    }

    /// 对外展示的连接参数。
    pub fn to_value(&self) -> Value {
        match self {
            ConnectionSettings::Mqtt(settings) => json!({
                "client_id": settings.client_id,
                "keep_alive": settings.keep_alive,
                "qos": settings.qos,
                "retain": settings.retain,
                "tls": settings.tls,
            }),
            ConnectionSettings::Https(settings) => json!({
                "method": settings.method.as_str(),
                "timeout": settings.timeout_seconds,
                "verify_tls": settings.verify_tls,
                "headers": settings.headers,
            }),
        }
    }
}

/// 校验主机与端口。
pub fn validate_endpoint(host: &str, port: Option<u32>) -> Result<(), ConfigValidationError> {
    let host = host.trim();
    if host.len() < 3 || host.len() > 255 {
        return Err(ConfigValidationError::new(
            "host must be between 3 and 255 characters",
        ));
    }
    if let Some(port) = port
        && !(1..=65535).contains(&port)
    {
        return Err(ConfigValidationError::new("port must be between 1 and 65535"));
    }
    Ok(())
}

fn parse_fields<T: serde::de::DeserializeOwned>(
    value: Value,
    field: &str,
) -> Result<T, ConfigValidationError> {
    if !value.is_object() {
        return Err(ConfigValidationError::new(format!("{field} must be an object")));
    }
    serde_json::from_value(value)
        .map_err(|err| ConfigValidationError::new(format!("invalid {field}: {err}")))
}

fn require_text(value: String, field: &str) -> Result<String, ConfigValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigValidationError::new(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_auth_defaults_to_bearer() {
        let auth = AuthConfig::from_parts("TOKEN", Some(&json!({"token": "abc"}))).expect("auth");
        assert_eq!(
            auth,
            AuthConfig::Token {
                token: "abc".to_string(),
                token_type: "Bearer".to_string()
            }
        );
        assert_eq!(auth.masked()["token"], "***");
    }

    #[test]
    fn user_pass_requires_both_fields() {
        let err = AuthConfig::from_parts("USER_PASS", Some(&json!({"username": "u"})))
            .expect_err("missing password");
        assert!(err.0.contains("password"));
    }

    #[test]
    fn api_key_defaults() {
        let auth = AuthConfig::from_parts("api_key", Some(&json!({"api_key": "k"}))).expect("auth");
        match auth {
            AuthConfig::ApiKey {
                location,
                parameter_name,
                ..
            } => {
                assert_eq!(location, ApiKeyLocation::Header);
                assert_eq!(parameter_name, "X-API-Key");
            }
            other => panic!("unexpected auth {other:?}"),
        }
    }

    #[test]
    fn mqtt_settings_validate_qos() {
        let err = ConnectionSettings::from_parts(ConnectionKind::Mqtt, Some(&json!({"qos": 3})))
            .expect_err("qos");
        assert!(err.0.contains("qos"));
        let settings = ConnectionSettings::from_parts(ConnectionKind::Mqtt, None).expect("defaults");
        assert_eq!(settings, ConnectionSettings::Mqtt(MqttSettings::default()));
    }

    #[test]
    fn https_settings_accept_verify_ssl_alias() {
        let settings = ConnectionSettings::from_parts(
            ConnectionKind::Https,
            Some(&json!({"method": "put", "timeout": 5, "verify_ssl": false})),
        )
        .expect("settings");
        match settings {
            ConnectionSettings::Https(https) => {
                assert_eq!(https.method, HttpMethod::Put);
                assert_eq!(https.timeout_seconds, 5);
                assert!(!https.verify_tls);
            }
            other => panic!("unexpected settings {other:?}"),
        }
    }

    #[test]
    fn endpoint_bounds() {
        assert!(validate_endpoint("ab", None).is_err());
        assert!(validate_endpoint("broker.local", Some(0)).is_err());
        assert!(validate_endpoint("broker.local", Some(1883)).is_ok());
    }
}
