use crate::{Transport, TransportError, TransportReceipt};
use async_trait::async_trait;
use devsim_storage::ConnectionRecord;
use domain::{ApiKeyLocation, AuthConfig, ConnectionSettings, HttpMethod, HttpsSettings};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

const USER_AGENT: &str = concat!("devsim/", env!("CARGO_PKG_VERSION"));

/// HTTPS 传输。
///
/// 证书校验在 client 级别配置，因此同时持有校验与不校验两个 client。
#[derive(Clone)]
pub struct HttpsTransport {
    verified: Client,
    insecure: Client,
}

impl HttpsTransport {
    pub fn new() -> Result<Self, TransportError> {
        let verified = Client::builder().user_agent(USER_AGENT).build()?;
        let insecure = Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { verified, insecure })
    }

    fn request(
        &self,
        connection: &ConnectionRecord,
        method: Method,
    ) -> Result<RequestBuilder, TransportError> {
        let settings = https_settings(connection)?;
        let client = if settings.verify_tls {
            &self.verified
        } else {
            &self.insecure
        };
        let mut builder = client
            .request(method, build_url(connection))
            .timeout(Duration::from_secs(settings.timeout_seconds));
        for (name, value) in &settings.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        Ok(apply_auth(builder, &connection.auth))
    }
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn send(
        &self,
        connection: &ConnectionRecord,
        payload: &Value,
    ) -> Result<TransportReceipt, TransportError> {
        let settings = https_settings(connection)?;
        let method = method_of(settings.method);
        let builder = self.request(connection, method.clone())?;
        let builder = if method == Method::GET {
            builder
        } else {
            builder.json(payload)
        };
        info!(
            target: "devsim.transport",
            connection_id = %connection.connection_id,
            method = %method,
            "https_send"
        );
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }
        Ok(TransportReceipt::new(format!("HTTP {}", status.as_u16())))
    }

    async fn test(&self, connection: &ConnectionRecord) -> Result<String, TransportError> {
        // 任何 HTTP 响应都说明端点可达。
        let response = self.request(connection, Method::HEAD)?.send().await?;
        Ok(format!(
            "https endpoint reachable (status {})",
            response.status().as_u16()
        ))
    }
}

fn https_settings(connection: &ConnectionRecord) -> Result<&HttpsSettings, TransportError> {
    match &connection.settings {
        ConnectionSettings::Https(settings) => Ok(settings),
        ConnectionSettings::Mqtt(_) => Err(TransportError::Config(format!(
            "connection {} is not an HTTPS connection",
            connection.connection_id
        ))),
    }
}

fn method_of(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn apply_auth(builder: RequestBuilder, auth: &AuthConfig) -> RequestBuilder {
    match auth {
        AuthConfig::None => builder,
        AuthConfig::UserPass { username, password } => {
            builder.basic_auth(username, Some(password))
        }
        AuthConfig::Token { token, token_type } => {
            builder.header("Authorization", format!("{token_type} {token}"))
        }
        AuthConfig::ApiKey {
            key,
            location: ApiKeyLocation::Header,
            parameter_name,
        } => builder.header(parameter_name.as_str(), key.as_str()),
        AuthConfig::ApiKey {
            key,
            location: ApiKeyLocation::Query,
            parameter_name,
        } => builder.query(&[(parameter_name.as_str(), key.as_str())]),
    }
}

/// 拼接请求 URL：host 未带 scheme 时默认 https，80/443 端口省略。
pub(crate) fn build_url(connection: &ConnectionRecord) -> String {
    let host = connection.host.trim().trim_end_matches('/');
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let base = match connection.port {
        Some(port) if port != 80 && port != 443 => format!("{base}:{port}"),
        _ => base,
    };
    let endpoint = connection.endpoint.trim();
    if endpoint.is_empty() {
        base
    } else if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}
