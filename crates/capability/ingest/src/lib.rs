//! CSV 接入：上传先生成预览暂存，确认后再提交到设备。
//!
//! `stage` 不修改任何设备状态；`commit` 通过存储层原子替换数据集并调整游标。

pub mod csv;

use devsim_storage::{DeviceRecord, DeviceStore, StorageError};
use devsim_telemetry::{record_csv_committed, record_csv_staged};
use domain::{CsvDataset, SessionContext};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// 接入错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    Format(String),
    #[error("device not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 接入配置。
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub preview_rows: usize,
    pub max_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            preview_rows: 5,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// 预览暂存：解析结果，尚未写入设备。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewStaging {
    pub file_name: String,
    pub headers: Vec<String>,
    pub csv_preview: Vec<Vec<String>>,
    pub json_preview: Vec<Map<String, Value>>,
    pub total_rows: usize,
    pub data: Vec<Map<String, Value>>,
}

impl From<PreviewStaging> for CsvDataset {
    fn from(staging: PreviewStaging) -> Self {
        CsvDataset {
            headers: staging.headers,
            csv_preview: staging.csv_preview,
            json_preview: staging.json_preview,
            data: staging.data,
            total_rows: staging.total_rows,
        }
    }
}

/// CSV 接入流水线。
#[derive(Clone)]
pub struct CsvIngestionPipeline {
    device_store: Arc<dyn DeviceStore>,
    config: IngestConfig,
}

impl CsvIngestionPipeline {
    pub fn new(device_store: Arc<dyn DeviceStore>, config: IngestConfig) -> Self {
        Self {
            device_store,
            config,
        }
    }

    /// 解析上传文件并生成预览，不修改设备。
    pub async fn stage(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PreviewStaging, IngestError> {
        if self.device_store.find_device(ctx, device_id).await?.is_none() {
            return Err(IngestError::NotFound(device_id.to_string()));
        }
        let staging = self.parse(file_name, bytes)?;
        record_csv_staged();
        info!(
            target: "devsim.ingest",
            device_id = %device_id,
            file_name = %file_name,
            total_rows = staging.total_rows,
            columns = staging.headers.len(),
            "csv_staged"
        );
        Ok(staging)
    }

    /// 纯解析：扩展名、编码、表头与数据行校验。
    pub fn parse(&self, file_name: &str, bytes: &[u8]) -> Result<PreviewStaging, IngestError> {
        let extension_ok = file_name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("csv"));
        if !extension_ok {
            return Err(IngestError::Format("only .csv files are accepted".to_string()));
        }
        if bytes.len() > self.config.max_bytes {
            return Err(IngestError::Format(format!(
                "file exceeds {} bytes",
                self.config.max_bytes
            )));
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|_| IngestError::Format("file must be UTF-8 encoded".to_string()))?;

        let mut records = csv::parse_records(text).into_iter();
        let headers: Vec<String> = match records.next() {
            Some(headers) => headers.into_iter().map(|h| h.trim().to_string()).collect(),
            None => return Err(IngestError::Format("csv header row is empty".to_string())),
        };
        if headers.iter().all(|header| header.is_empty()) {
            return Err(IngestError::Format("csv header row is empty".to_string()));
        }
        let rows: Vec<Vec<String>> = records.collect();
        if rows.is_empty() {
            return Err(IngestError::Format(
                "csv must contain at least one data row besides the header".to_string(),
            ));
        }

        let data: Vec<Map<String, Value>> = rows.iter().map(|row| project_row(&headers, row)).collect();
        let preview = self.config.preview_rows.min(rows.len());
        Ok(PreviewStaging {
            file_name: file_name.to_string(),
            csv_preview: rows[..preview].to_vec(),
            json_preview: data[..preview].to_vec(),
            total_rows: rows.len(),
            headers,
            data,
        })
    }

    /// 确认提交：客户端未回传 `data` 时回退到 `json_preview`。
    pub async fn commit(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        mut dataset: CsvDataset,
    ) -> Result<DeviceRecord, IngestError> {
        if dataset.headers.is_empty() {
            return Err(IngestError::Format("csv_data.headers is required".to_string()));
        }
        if dataset.data.is_empty() {
            dataset.data = dataset.json_preview.clone();
        }
        if dataset.data.is_empty() {
            return Err(IngestError::Format("csv_data contains no rows".to_string()));
        }
        dataset.total_rows = dataset.data.len();

        let device = self
            .device_store
            .commit_dataset(ctx, device_id, dataset)
            .await?
            .ok_or_else(|| IngestError::NotFound(device_id.to_string()))?;
        record_csv_committed();
        info!(
            target: "devsim.ingest",
            device_id = %device.device_id,
            total_rows = device.row_count(),
            current_row_index = device.current_row_index,
            "csv_committed"
        );
        Ok(device)
    }
}

/// 行投影为 JSON 对象：缺失列补空串，多余列丢弃。
fn project_row(headers: &[String], row: &[String]) -> Map<String, Value> {
    headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            let value = row.get(index).cloned().unwrap_or_default();
            (header.clone(), Value::String(value))
        })
        .collect()
}
