//! 传输能力：把设备负载投递到连接所描述的远端。
//!
//! - `Transport`：投递与连通性测试的统一接口
//! - `MqttTransport`：基于 rumqttc，每次投递建立短连接
//! - `HttpsTransport`：基于 reqwest
//! - `RoutingTransport`：按连接类型分发

mod https;
mod mqtt;

use async_trait::async_trait;
use devsim_storage::ConnectionRecord;
use domain::{ConnectionKind, ConnectionSettings};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub use https::HttpsTransport;
pub use mqtt::MqttTransport;

/// 传输错误。
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid connection config: {0}")]
    Config(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("remote returned HTTP {0}")]
    HttpStatus(u16),
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("mqtt error: {0}")]
    Mqtt(String),
}

/// 投递回执。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReceipt {
    pub detail: String,
}

impl TransportReceipt {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// 传输抽象。
#[async_trait]
pub trait Transport: Send + Sync {
    /// 投递一次负载。
    async fn send(
        &self,
        connection: &ConnectionRecord,
        payload: &Value,
    ) -> Result<TransportReceipt, TransportError>;

    /// 连通性测试，成功时返回描述信息。
    async fn test(&self, connection: &ConnectionRecord) -> Result<String, TransportError>;
}

/// 按连接类型路由到 MQTT 或 HTTPS 实现。
#[derive(Clone)]
pub struct RoutingTransport {
    mqtt: Arc<dyn Transport>,
    https: Arc<dyn Transport>,
}

impl RoutingTransport {
    pub fn new(mqtt: Arc<dyn Transport>, https: Arc<dyn Transport>) -> Self {
        Self { mqtt, https }
    }

    /// 使用 rumqttc / reqwest 的默认组合。
    pub fn with_defaults() -> Result<Self, TransportError> {
        Ok(Self::new(
            Arc::new(MqttTransport::new()),
            Arc::new(HttpsTransport::new()?),
        ))
    }

    fn route(&self, connection: &ConnectionRecord) -> &Arc<dyn Transport> {
        match connection.kind() {
            ConnectionKind::Mqtt => &self.mqtt,
            ConnectionKind::Https => &self.https,
        }
    }
}

#[async_trait]
impl Transport for RoutingTransport {
    async fn send(
        &self,
        connection: &ConnectionRecord,
        payload: &Value,
    ) -> Result<TransportReceipt, TransportError> {
        self.route(connection).send(connection, payload).await
    }

    async fn test(&self, connection: &ConnectionRecord) -> Result<String, TransportError> {
        self.route(connection).test(connection).await
    }
}

/// 单次投递的超时上限：HTTPS 取连接自身的 `timeout`，MQTT 取进程级配置。
pub fn delivery_timeout(connection: &ConnectionRecord, mqtt_timeout: Duration) -> Duration {
    match &connection.settings {
        ConnectionSettings::Https(settings) => Duration::from_secs(settings.timeout_seconds),
        ConnectionSettings::Mqtt(_) => mqtt_timeout,
    }
}

/// 在超时内执行一次投递；到期返回 `TransportError::Timeout`。
pub async fn send_with_timeout(
    transport: &dyn Transport,
    connection: &ConnectionRecord,
    payload: &Value,
    timeout: Duration,
) -> Result<TransportReceipt, TransportError> {
    match tokio::time::timeout(timeout, transport.send(connection, payload)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout.as_millis() as u64)),
    }
}

/// 在超时内执行一次连通性测试。
pub async fn test_with_timeout(
    transport: &dyn Transport,
    connection: &ConnectionRecord,
    timeout: Duration,
) -> Result<String, TransportError> {
    match tokio::time::timeout(timeout, transport.test(connection)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout.as_millis() as u64)),
    }
}
