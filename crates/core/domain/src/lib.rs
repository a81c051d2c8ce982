pub mod connection;
pub mod dataset;
pub mod transmission;

pub use connection::{
    ApiKeyLocation, AuthConfig, AuthKind, ConnectionKind, ConnectionSettings, ConfigValidationError,
    HttpMethod, HttpsSettings, MqttSettings, validate_endpoint,
};
pub use dataset::CsvDataset;
pub use transmission::{
    BulkOperation, DeviceType, InvalidTransition, ProjectTransmissionStatus, TransmissionCommand,
    TransmissionState, TransmissionStatus, TransmissionType,
};

/// 会话上下文：每次调用显式传入，替代全局“当前选中”状态。
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub actor: String,
    pub request_id: String,
    pub trace_id: String,
}

impl SessionContext {
    /// 构造带请求追踪标识的会话上下文。
    pub fn new(
        actor: impl Into<String>,
        request_id: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            request_id: request_id.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 仅指定操作者（测试与后台任务使用）。
    pub fn for_actor(actor: impl Into<String>) -> Self {
        Self::new(actor, "", "")
    }

    /// 调度器等后台任务使用的系统上下文。
    pub fn system() -> Self {
        Self::for_actor("system")
    }
}

impl Default for SessionContext {
    /// 空上下文（仅用于测试或占位）。
    fn default() -> Self {
        Self {
            actor: "".to_string(),
            request_id: "".to_string(),
            trace_id: "".to_string(),
        }
    }
}
