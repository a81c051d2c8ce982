//! 传输生命周期：设备状态机、自动调度、项目批量编排与历史查询。
//!
//! - `DeviceTransmissionController`：单设备状态机与游标，所有变更持有设备锁
//! - `TransmissionScheduler`：每个武装设备一个定时任务，`CancellationToken` 取消
//! - `ProjectTransmissionOrchestrator`：项目级扇出与成员管理
//! - `TransmissionHistoryService`：分页查询与 CSV 导出
//! - `ConnectionTester`：连接连通性测试

mod connections;
mod controller;
mod history;
mod locks;
mod orchestrator;
mod payload;
mod scheduler;

use devsim_storage::StorageError;
use domain::InvalidTransition;

pub use connections::ConnectionTester;
pub use controller::{
    ControllerConfig, ControllerStores, DeviceTransmissionController, DeviceTransmissionState,
    TransmissionConfigUpdate, TransmitOutcome,
};
pub use history::{HistoryConfig, HistoryPage, TransmissionHistoryService};
pub use locks::DeviceLocks;
pub use orchestrator::{
    BulkItemStatus, BulkOutcome, BulkResult, DeviceReadiness, DeviceTransmissionStats,
    MembershipResult, MembershipStatus, ProjectStats, ProjectTransmissionOrchestrator,
    ProjectValidation,
};
pub use payload::build_payload;
pub use scheduler::{TickHandler, TransmissionScheduler};

/// 自动传输频率上限（秒）。
pub const MAX_FREQUENCY_SECONDS: u32 = 86_400;

/// 传输链路错误。
#[derive(Debug, thiserror::Error)]
pub enum TransmissionError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<InvalidTransition> for TransmissionError {
    fn from(err: InvalidTransition) -> Self {
        TransmissionError::Conflict(err.to_string())
    }
}

/// 毫秒时间戳格式化为 RFC3339（UTC）。
pub fn format_timestamp(ts_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms)
        .map(|value| value.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}

pub(crate) fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
