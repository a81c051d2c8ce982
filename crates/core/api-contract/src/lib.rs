//! 稳定的请求/响应 DTO 与错误体。
//!
//! 字段统一使用 snake_case；时间戳为 RFC3339 字符串；
//! 连接的敏感认证字段在响应中以 `***` 掩码输出。

use domain::{
    BulkOperation, CsvDataset, DeviceType, ProjectTransmissionStatus, TransmissionState,
    TransmissionStatus, TransmissionType,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 失败响应的错误体。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// 区分“字段缺省”与“显式 null”：缺省为 `None`，null 为 `Some(None)`。
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// 设备
// ---------------------------------------------------------------------------

/// 设备创建请求体。
#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub name: String,
    pub description: Option<String>,
    pub device_type: Option<DeviceType>,
    pub transmission_frequency: Option<u32>,
}

/// 设备返回结构。
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDto {
    pub id: String,
    pub reference: String,
    pub name: String,
    pub description: Option<String>,
    pub device_type: DeviceType,
    pub transmission_frequency: u32,
    pub transmission_enabled: bool,
    pub transmission_paused: bool,
    pub transmission_state: TransmissionState,
    pub selected_connection_id: Option<String>,
    pub current_row_index: u32,
    pub row_count: usize,
    pub has_csv_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_data: Option<CsvDataset>,
    pub project_id: Option<String>,
    pub last_transmission: Option<String>,
    pub created_at: String,
}

/// 设备复制请求体。
#[derive(Debug, Deserialize)]
pub struct DuplicateDeviceRequest {
    pub count: Option<u32>,
}

/// 设备复制响应。
#[derive(Debug, Serialize)]
pub struct DuplicateDevicesResponse {
    pub duplicates_created: usize,
    pub duplicated_devices: Vec<DeviceDto>,
}

/// 传输配置更新请求体；未出现的字段保持不变，`connection_id: null` 清空选择。
#[derive(Debug, Default, Deserialize)]
pub struct TransmissionConfigRequest {
    pub device_type: Option<DeviceType>,
    pub transmission_frequency: Option<u32>,
    pub transmission_enabled: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub connection_id: Option<Option<String>>,
}

/// 传输配置视图。
#[derive(Debug, Serialize)]
pub struct TransmissionConfigDto {
    pub device_id: String,
    pub device_type: DeviceType,
    pub transmission_frequency: u32,
    pub transmission_enabled: bool,
    pub transmission_paused: bool,
    pub transmission_state: TransmissionState,
    pub connection_id: Option<String>,
    pub has_csv_data: bool,
}

/// 指定连接的请求体（start / transmit）。
#[derive(Debug, Deserialize)]
pub struct ConnectionSelection {
    pub connection_id: String,
}

/// 可选连接覆盖的请求体（resume / 项目批量操作）。
#[derive(Debug, Default, Deserialize)]
pub struct ConnectionOverride {
    pub connection_id: Option<String>,
}

/// 手动传输响应。
#[derive(Debug, Serialize)]
pub struct TransmitResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_row_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transmission: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetSensorResponse {
    pub current_row_index: u32,
}

/// 上传预览。
#[derive(Debug, Serialize)]
pub struct PreviewDto {
    pub file_name: String,
    pub headers: Vec<String>,
    pub csv_preview: Vec<Vec<String>>,
    pub json_preview: Vec<serde_json::Map<String, Value>>,
    pub total_rows: usize,
    pub data: Vec<serde_json::Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub preview: PreviewDto,
}

/// 确认提交请求体。
#[derive(Debug, Deserialize)]
pub struct SaveCsvRequest {
    pub csv_data: CsvDataset,
}

// ---------------------------------------------------------------------------
// 传输历史
// ---------------------------------------------------------------------------

/// 设备历史查询参数。
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<String>,
    pub connection_id: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub format: Option<String>,
}

/// 项目历史窗口参数。
#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransmissionRecordDto {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    pub device_reference: String,
    pub project_id: Option<String>,
    pub connection_id: String,
    pub connection_name: String,
    pub status: TransmissionStatus,
    pub transmission_type: TransmissionType,
    pub row_index: Option<u32>,
    pub timestamp: String,
    pub response_time: Option<u64>,
    pub error_message: Option<String>,
}

/// 设备历史分页响应。
#[derive(Debug, Serialize)]
pub struct HistoryPageDto {
    pub history: Vec<TransmissionRecordDto>,
    pub total: u64,
    pub total_pages: u64,
    pub page: u64,
    pub limit: u64,
}

/// 项目历史窗口响应。
#[derive(Debug, Serialize)]
pub struct ProjectHistoryDto {
    pub transmissions: Vec<TransmissionRecordDto>,
}

// ---------------------------------------------------------------------------
// 连接
// ---------------------------------------------------------------------------

/// 连接创建请求体：`auth_config` / `connection_config` 按判别值解析。
#[derive(Debug, Deserialize)]
pub struct CreateConnectionRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub connection_type: String,
    pub host: String,
    pub port: Option<u32>,
    pub endpoint: Option<String>,
    pub auth_type: Option<String>,
    pub auth_config: Option<Value>,
    pub connection_config: Option<Value>,
    pub is_active: Option<bool>,
}

/// 连接更新请求体；类型不可修改。
#[derive(Debug, Default, Deserialize)]
pub struct UpdateConnectionRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub host: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub port: Option<Option<u32>>,
    pub endpoint: Option<String>,
    pub auth_type: Option<String>,
    pub auth_config: Option<Value>,
    pub connection_config: Option<Value>,
    pub is_active: Option<bool>,
}

/// 连接返回结构（认证字段已掩码）。
#[derive(Debug, Serialize)]
pub struct ConnectionDto {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub connection_type: String,
    pub host: String,
    pub port: Option<u16>,
    pub endpoint: String,
    pub auth_type: String,
    pub auth_config: Value,
    pub connection_config: Value,
    pub is_active: bool,
    pub created_at: String,
}

/// 单次连接测试结果。
#[derive(Debug, Serialize)]
pub struct ConnectionTestDto {
    pub success: bool,
    pub response_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestRecordDto {
    pub id: String,
    pub connection_id: String,
    pub success: bool,
    pub response_time: u64,
    pub message: Option<String>,
    pub timestamp: String,
}

/// 枚举选项（连接类型 / 认证类型）及其配置字段。
#[derive(Debug, Serialize)]
pub struct OptionDto {
    pub value: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_port: Option<u16>,
    pub fields: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTypesResponse {
    pub types: Vec<OptionDto>,
}

#[derive(Debug, Serialize)]
pub struct AuthTypesResponse {
    pub auth_types: Vec<OptionDto>,
}

// ---------------------------------------------------------------------------
// 项目
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct ProjectDto {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub transmission_status: ProjectTransmissionStatus,
    pub created_at: String,
}

/// 项目详情：项目字段与成员设备。
#[derive(Debug, Serialize)]
pub struct ProjectDetailDto {
    #[serde(flatten)]
    pub project: ProjectDto,
    pub device_count: usize,
    pub devices: Vec<DeviceDto>,
}

#[derive(Debug, Deserialize)]
pub struct AddDevicesRequest {
    pub device_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectOperationDto {
    pub id: String,
    pub project_id: String,
    pub operation: BulkOperation,
    pub actor: String,
    pub connection_id: Option<String>,
    pub total_devices: u32,
    pub successful_operations: u32,
    pub failed_operations: u32,
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// 指标
// ---------------------------------------------------------------------------

/// 指标快照。
#[derive(Debug, Serialize)]
pub struct MetricsSnapshotDto {
    pub manual_transmissions: u64,
    pub automatic_transmissions: u64,
    pub transmission_success: u64,
    pub transmission_failure: u64,
    pub transmission_timeouts: u64,
    pub transmission_latency_ms_total: u64,
    pub transmission_latency_ms_count: u64,
    pub scheduler_ticks: u64,
    pub scheduler_ticks_skipped: u64,
    pub armed_devices: u64,
    pub bulk_operations: u64,
    pub csv_staged: u64,
    pub csv_committed: u64,
    pub connection_tests: u64,
}
