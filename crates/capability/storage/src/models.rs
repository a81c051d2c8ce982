//! 数据模型
//!
//! 定义所有存储相关的数据模型和更新结构：
//! - 设备模型：DeviceRecord, DeviceUpdate（含传输状态与数据游标）
//! - 连接模型：ConnectionRecord, ConnectionUpdate, ConnectionTestRecord
//! - 项目模型：ProjectRecord, ProjectUpdate
//! - 历史模型：TransmissionRecord, ProjectOperationRecord
//! - 查询模型：HistoryScope, HistoryFilter, HistorySlice

use domain::{
    AuthConfig, BulkOperation, ConnectionKind, ConnectionSettings, CsvDataset, DeviceType,
    ProjectTransmissionStatus, TransmissionState, TransmissionStatus, TransmissionType,
};

/// 设备记录。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device_id: String,
    /// 8 位大写字母数字，全局唯一。
    pub reference: String,
    pub name: String,
    pub description: Option<String>,
    pub device_type: DeviceType,
    /// 自动传输间隔（秒）。
    pub transmission_frequency: u32,
    pub transmission_state: TransmissionState,
    pub selected_connection_id: Option<String>,
    pub current_row_index: u32,
    pub csv_data: Option<CsvDataset>,
    pub project_id: Option<String>,
    pub last_transmission_ms: Option<i64>,
    pub created_at_ms: i64,
}

impl DeviceRecord {
    /// 已提交数据集的行数，未提交时为 0。
    pub fn row_count(&self) -> usize {
        self.csv_data.as_ref().map(CsvDataset::row_count).unwrap_or(0)
    }

    pub fn has_dataset(&self) -> bool {
        self.row_count() > 0
    }

    /// 替换数据集：首次提交游标归零，再次提交保留游标，越界则归零。
    pub fn apply_dataset(&mut self, dataset: CsvDataset) {
        let first_commit = self.csv_data.is_none();
        if first_commit || self.current_row_index as usize >= dataset.row_count() {
            self.current_row_index = 0;
        }
        self.csv_data = Some(dataset);
    }

    /// 游标前进一行（按行数取模）。
    pub fn advance_cursor(&mut self) -> u32 {
        let rows = self.row_count();
        self.current_row_index = if rows == 0 {
            0
        } else {
            ((self.current_row_index as usize + 1) % rows) as u32
        };
        self.current_row_index
    }
}

/// 设备更新输入；`Option<Option<_>>` 的外层 `None` 表示不修改。
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub device_type: Option<DeviceType>,
    pub transmission_frequency: Option<u32>,
    pub transmission_state: Option<TransmissionState>,
    pub selected_connection_id: Option<Option<String>>,
    pub current_row_index: Option<u32>,
    pub last_transmission_ms: Option<i64>,
}

/// 设备加入项目的结果。
#[derive(Debug, Clone, PartialEq)]
pub enum AssignOutcome {
    Assigned(DeviceRecord),
    AlreadyMember,
    /// 设备已属于其他项目（附该项目 ID）。
    OwnedByOther(String),
    NotFound,
}

/// 连接记录。
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRecord {
    pub connection_id: String,
    pub name: String,
    pub description: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    /// MQTT 为 topic，HTTPS 为路径。
    pub endpoint: String,
    pub auth: AuthConfig,
    pub settings: ConnectionSettings,
    pub is_active: bool,
    pub created_at_ms: i64,
}

impl ConnectionRecord {
    pub fn kind(&self) -> ConnectionKind {
        self.settings.kind()
    }
}

/// 连接更新输入。
#[derive(Debug, Clone, Default)]
pub struct ConnectionUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub host: Option<String>,
    pub port: Option<Option<u16>>,
    pub endpoint: Option<String>,
    pub auth: Option<AuthConfig>,
    pub settings: Option<ConnectionSettings>,
    pub is_active: Option<bool>,
}

/// 连接测试记录。
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionTestRecord {
    pub test_id: String,
    pub connection_id: String,
    pub success: bool,
    pub response_time_ms: u64,
    pub message: Option<String>,
    pub ts_ms: i64,
}

/// 项目记录。
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub transmission_status: ProjectTransmissionStatus,
    pub created_at_ms: i64,
}

/// 项目更新输入。
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

/// 传输记录（只追加，写入后不可变）。
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionRecord {
    pub transmission_id: String,
    pub device_id: String,
    pub device_name: String,
    pub device_reference: String,
    /// 写入时设备所属项目。
    pub project_id: Option<String>,
    pub connection_id: String,
    pub connection_name: String,
    pub status: TransmissionStatus,
    pub transmission_type: TransmissionType,
    pub row_index: Option<u32>,
    pub timestamp_ms: i64,
    pub response_time_ms: Option<u64>,
    /// 仅 FAILED 时存在。
    pub error_message: Option<String>,
}

/// 项目批量操作的聚合记录。
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectOperationRecord {
    pub operation_id: String,
    pub project_id: String,
    pub operation: BulkOperation,
    pub actor: String,
    pub connection_id: Option<String>,
    pub total_devices: u32,
    pub successful_operations: u32,
    pub failed_operations: u32,
    pub ts_ms: i64,
}

/// 历史查询范围。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryScope {
    Device(String),
    Project(String),
}

/// 历史查询过滤条件（AND 组合）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub status: Option<TransmissionStatus>,
    pub connection_id: Option<String>,
}

impl HistoryFilter {
    pub fn matches(&self, record: &TransmissionRecord) -> bool {
        self.status.is_none_or(|status| record.status == status)
            && self
                .connection_id
                .as_deref()
                .is_none_or(|connection_id| record.connection_id == connection_id)
    }
}

impl HistoryScope {
    pub fn matches(&self, record: &TransmissionRecord) -> bool {
        match self {
            HistoryScope::Device(device_id) => &record.device_id == device_id,
            HistoryScope::Project(project_id) => {
                record.project_id.as_deref() == Some(project_id.as_str())
            }
        }
    }
}

/// 历史查询结果片段：`total` 为过滤后的总数。
#[derive(Debug, Clone, Default)]
pub struct HistorySlice {
    pub records: Vec<TransmissionRecord>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn dataset(rows: usize) -> CsvDataset {
        let data: Vec<Map<String, serde_json::Value>> = (0..rows)
            .map(|index| {
                let mut row = Map::new();
                row.insert("value".to_string(), json!(index.to_string()));
                row
            })
            .collect();
        CsvDataset {
            headers: vec!["value".to_string()],
            csv_preview: Vec::new(),
            json_preview: Vec::new(),
            total_rows: rows,
            data,
        }
    }

    fn device() -> DeviceRecord {
        DeviceRecord {
            device_id: "d1".to_string(),
            reference: "ABCD1234".to_string(),
            name: "sensor".to_string(),
            description: None,
            device_type: DeviceType::Sensor,
            transmission_frequency: 3600,
            transmission_state: TransmissionState::Inactive,
            selected_connection_id: None,
            current_row_index: 0,
            csv_data: None,
            project_id: None,
            last_transmission_ms: None,
            created_at_ms: 0,
        }
    }

    #[test]
    fn recommit_clamps_cursor_past_new_rows() {
        let mut device = device();
        device.apply_dataset(dataset(10));
        device.current_row_index = 7;
        device.apply_dataset(dataset(3));
        assert_eq!(device.current_row_index, 0);
    }

    #[test]
    fn recommit_keeps_cursor_in_range() {
        let mut device = device();
        device.apply_dataset(dataset(10));
        device.current_row_index = 2;
        device.apply_dataset(dataset(5));
        assert_eq!(device.current_row_index, 2);
    }

    #[test]
    fn cursor_wraps() {
        let mut device = device();
        device.apply_dataset(dataset(2));
        assert_eq!(device.advance_cursor(), 1);
        assert_eq!(device.advance_cursor(), 0);
    }
}
