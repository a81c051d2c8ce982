//! 传输历史查询：设备分页视图、项目窗口视图与 CSV 导出。

use crate::{TransmissionError, format_timestamp};
use devsim_ingest::csv::write_row;
use devsim_storage::{
    DeviceStore, HistoryFilter, HistoryScope, ProjectStore, TransmissionHistoryStore,
    TransmissionRecord,
};
use domain::SessionContext;
use std::sync::Arc;

const DEVICE_EXPORT_HEADER: [&str; 5] = ["Connection", "Status", "Row", "Timestamp", "Error"];
const PROJECT_EXPORT_HEADER: [&str; 8] = [
    "Device",
    "Reference",
    "Connection",
    "Status",
    "Type",
    "Row",
    "Timestamp",
    "Error",
];
const PROJECT_WINDOW_DEFAULT: u64 = 100;
const PROJECT_WINDOW_MAX: u64 = 1000;

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// 分页结果。
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub history: Vec<TransmissionRecord>,
    pub total: u64,
    pub total_pages: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Clone)]
pub struct TransmissionHistoryService {
    history_store: Arc<dyn TransmissionHistoryStore>,
    device_store: Arc<dyn DeviceStore>,
    project_store: Arc<dyn ProjectStore>,
    config: HistoryConfig,
}

impl TransmissionHistoryService {
    pub fn new(
        history_store: Arc<dyn TransmissionHistoryStore>,
        device_store: Arc<dyn DeviceStore>,
        project_store: Arc<dyn ProjectStore>,
        config: HistoryConfig,
    ) -> Self {
        Self {
            history_store,
            device_store,
            project_store,
            config,
        }
    }

    /// 设备历史分页（新到旧）；越界页返回空列表。
    pub async fn device_page(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        filter: &HistoryFilter,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> Result<HistoryPage, TransmissionError> {
        self.ensure_device(ctx, device_id).await?;
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(TransmissionError::Validation("page must be >= 1".to_string()));
        }
        let limit = limit.unwrap_or(self.config.default_limit);
        if limit == 0 {
            return Err(TransmissionError::Validation("limit must be >= 1".to_string()));
        }
        let limit = limit.min(self.config.max_limit);
        let offset = (page - 1).saturating_mul(limit);
        let slice = self
            .history_store
            .query(
                ctx,
                &HistoryScope::Device(device_id.to_string()),
                filter,
                offset,
                Some(limit),
            )
            .await?;
        Ok(HistoryPage {
            history: slice.records,
            total: slice.total,
            total_pages: slice.total.div_ceil(limit),
            page,
            limit,
        })
    }

    /// 项目历史窗口：`limit` 1..=1000（默认 100），`offset` 从 0 起。
    pub async fn project_window(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<TransmissionRecord>, TransmissionError> {
        self.ensure_project(ctx, project_id).await?;
        let limit = limit.unwrap_or(PROJECT_WINDOW_DEFAULT);
        if limit == 0 || limit > PROJECT_WINDOW_MAX {
            return Err(TransmissionError::Validation(format!(
                "limit must be between 1 and {PROJECT_WINDOW_MAX}"
            )));
        }
        let slice = self
            .history_store
            .query(
                ctx,
                &HistoryScope::Project(project_id.to_string()),
                &HistoryFilter::default(),
                offset.unwrap_or(0),
                Some(limit),
            )
            .await?;
        Ok(slice.records)
    }

    /// 设备历史 CSV 导出（不分页）。
    pub async fn export_device_csv(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        filter: &HistoryFilter,
    ) -> Result<String, TransmissionError> {
        self.ensure_device(ctx, device_id).await?;
        let records = self
            .all_records(ctx, HistoryScope::Device(device_id.to_string()), filter)
            .await?;
        Ok(render_csv(&DEVICE_EXPORT_HEADER, records.iter().map(device_row)))
    }

    /// 项目历史 CSV 导出（不分页）。
    pub async fn export_project_csv(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        filter: &HistoryFilter,
    ) -> Result<String, TransmissionError> {
        self.ensure_project(ctx, project_id).await?;
        let records = self
            .all_records(ctx, HistoryScope::Project(project_id.to_string()), filter)
            .await?;
        Ok(render_csv(&PROJECT_EXPORT_HEADER, records.iter().map(project_row)))
    }

    async fn all_records(
        &self,
        ctx: &SessionContext,
        scope: HistoryScope,
        filter: &HistoryFilter,
    ) -> Result<Vec<TransmissionRecord>, TransmissionError> {
        let slice = self.history_store.query(ctx, &scope, filter, 0, None).await?;
        Ok(slice.records)
    }

    async fn ensure_device(&self, ctx: &SessionContext, device_id: &str) -> Result<(), TransmissionError> {
        match self.device_store.find_device(ctx, device_id).await? {
            Some(_) => Ok(()),
            None => Err(TransmissionError::NotFound(format!("device not found: {device_id}"))),
        }
    }

    async fn ensure_project(&self, ctx: &SessionContext, project_id: &str) -> Result<(), TransmissionError> {
        match self.project_store.find_project(ctx, project_id).await? {
            Some(_) => Ok(()),
            None => Err(TransmissionError::NotFound(format!("project not found: {project_id}"))),
        }
    }
}

fn device_row(record: &TransmissionRecord) -> Vec<String> {
    vec![
        record.connection_name.clone(),
        record.status.as_str().to_string(),
        row_cell(record),
        format_timestamp(record.timestamp_ms),
        record.error_message.clone().unwrap_or_default(),
    ]
}

fn project_row(record: &TransmissionRecord) -> Vec<String> {
    vec![
        record.device_name.clone(),
        record.device_reference.clone(),
        record.connection_name.clone(),
        record.status.as_str().to_string(),
        record.transmission_type.as_str().to_string(),
        row_cell(record),
        format_timestamp(record.timestamp_ms),
        record.error_message.clone().unwrap_or_default(),
    ]
}

fn row_cell(record: &TransmissionRecord) -> String {
    record
        .row_index
        .map(|index| index.to_string())
        .unwrap_or_default()
}

fn render_csv<I>(header: &[&str], rows: I) -> String
where
    I: Iterator<Item = Vec<String>>,
{
    let mut out = write_row(header);
    out.push('\n');
    for row in rows {
        out.push_str(&write_row(&row));
        out.push('\n');
    }
    out
}
