//! Postgres 设备存储实现
//!
//! 设计要点：
//! - 数据集提交与游标前进在单条 `update` 中完成，Postgres 行锁保证原子性
//! - `row_count` 列冗余保存数据集行数，供游标取模使用

use crate::error::StorageError;
use crate::models::{AssignOutcome, DeviceRecord, DeviceUpdate};
use crate::postgres::{parse_column, to_i32, to_u32};
use crate::traits::DeviceStore;
use crate::validation::{ensure_id, ensure_session};
use domain::{CsvDataset, DeviceType, SessionContext, TransmissionState};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const DEVICE_COLUMNS: &str = "device_id, reference, name, description, device_type, \
     transmission_frequency, transmission_state, selected_connection_id, current_row_index, \
     csv_data, project_id, \
     (extract(epoch from last_transmission_at) * 1000)::bigint as last_transmission_ms, \
     (extract(epoch from created_at) * 1000)::bigint as created_at_ms";

pub struct PgDeviceStore {
    pub pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }

    async fn fetch_where(
        &self,
        condition: &str,
        value: Option<&str>,
    ) -> Result<Vec<DeviceRecord>, StorageError> {
        let sql = format!(
            "select {DEVICE_COLUMNS} from devices where {condition} order by created_at, name"
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = value {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(device_from_row).collect()
    }
}

fn device_from_row(row: &PgRow) -> Result<DeviceRecord, StorageError> {
    let device_type: String = row.try_get("device_type")?;
    let state: String = row.try_get("transmission_state")?;
    let csv_data: Option<String> = row.try_get("csv_data")?;
    let csv_data = match csv_data {
        Some(raw) => Some(serde_json::from_str::<CsvDataset>(&raw)?),
        None => None,
    };
    Ok(DeviceRecord {
        device_id: row.try_get("device_id")?,
        reference: row.try_get("reference")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        device_type: parse_column(&device_type, "device_type", DeviceType::parse)?,
        transmission_frequency: to_u32(row.try_get("transmission_frequency")?),
        transmission_state: parse_column(&state, "transmission_state", TransmissionState::parse)?,
        selected_connection_id: row.try_get("selected_connection_id")?,
        current_row_index: to_u32(row.try_get("current_row_index")?),
        csv_data,
        project_id: row.try_get("project_id")?,
        last_transmission_ms: row.try_get("last_transmission_ms")?,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

#[async_trait::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn list_devices(&self, ctx: &SessionContext) -> Result<Vec<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        self.fetch_where("true", None).await
    }

    async fn list_unassigned_devices(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        self.fetch_where("project_id is null", None).await
    }

    async fn list_project_devices(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<Vec<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        self.fetch_where("project_id = $1", Some(project_id)).await
    }

    async fn find_device(
        &self,
        ctx: &SessionContext,
        device_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut items = self.fetch_where("device_id = $1", Some(device_id)).await?;
        Ok(items.pop())
    }

    async fn find_by_reference(
        &self,
        ctx: &SessionContext,
        reference: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut items = self.fetch_where("reference = $1", Some(reference)).await?;
        Ok(items.pop())
    }

    async fn create_device(
        &self,
        ctx: &SessionContext,
        record: DeviceRecord,
    ) -> Result<DeviceRecord, StorageError> {
        ensure_session(ctx)?;
        ensure_id(&record.device_id, "device_id")?;
        let csv_data = record
            .csv_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            "insert into devices \
             (device_id, reference, name, description, device_type, transmission_frequency, \
              transmission_state, selected_connection_id, current_row_index, csv_data, row_count, \
              project_id, last_transmission_at, created_at) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
                     to_timestamp($13 / 1000.0), to_timestamp($14 / 1000.0))",
        )
        .bind(&record.device_id)
        .bind(&record.reference)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.device_type.as_str())
        .bind(to_i32(record.transmission_frequency))
        .bind(record.transmission_state.as_str())
        .bind(&record.selected_connection_id)
        .bind(to_i32(record.current_row_index))
        .bind(csv_data)
        .bind(record.row_count() as i32)
        .bind(&record.project_id)
        .bind(record.last_transmission_ms.map(|ms| ms as f64))
        .bind(record.created_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update_device(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        update: DeviceUpdate,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let sql = format!(
            "update devices set \
             name = coalesce($2, name), \
             description = case when $3 then $4 else description end, \
             device_type = coalesce($5, device_type), \
             transmission_frequency = coalesce($6, transmission_frequency), \
             transmission_state = coalesce($7, transmission_state), \
             selected_connection_id = case when $8 then $9 else selected_connection_id end, \
             current_row_index = case \
                 when $10::integer is null then current_row_index \
                 when $10 >= row_count then 0 \
                 else $10 end, \
             last_transmission_at = coalesce(to_timestamp($11 / 1000.0), last_transmission_at) \
             where device_id = $1 \
             returning {DEVICE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .bind(update.name)
            .bind(update.description.is_some())
            .bind(update.description.flatten())
            .bind(update.device_type.map(|value| value.as_str()))
            .bind(update.transmission_frequency.map(to_i32))
            .bind(update.transmission_state.map(|value| value.as_str()))
            .bind(update.selected_connection_id.is_some())
            .bind(update.selected_connection_id.flatten())
            .bind(update.current_row_index.map(to_i32))
            .bind(update.last_transmission_ms.map(|ms| ms as f64))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn delete_device(
        &self,
        ctx: &SessionContext,
        device_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_session(ctx)?;
        let result = sqlx::query("delete from devices where device_id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit_dataset(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        dataset: CsvDataset,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let rows = dataset.row_count() as i32;
        let raw = serde_json::to_string(&dataset)?;
        // update 右侧表达式读取的都是旧行值。
        let sql = format!(
            "update devices set \
             current_row_index = case \
                 when csv_data is null or current_row_index >= $3 then 0 \
                 else current_row_index end, \
             csv_data = $2, \
             row_count = $3 \
             where device_id = $1 \
             returning {DEVICE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .bind(raw)
            .bind(rows)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn mark_transmitted(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        transmitted_at_ms: i64,
        advance_cursor: bool,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let sql = format!(
            "update devices set \
             current_row_index = case \
                 when not $3 then current_row_index \
                 when row_count > 0 then (current_row_index + 1) % row_count \
                 else 0 end, \
             last_transmission_at = to_timestamp($2 / 1000.0) \
             where device_id = $1 \
             returning {DEVICE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .bind(transmitted_at_ms as f64)
            .bind(advance_cursor)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn assign_project(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        project_id: &str,
    ) -> Result<AssignOutcome, StorageError> {
        ensure_session(ctx)?;
        ensure_id(project_id, "project_id")?;
        let sql = format!(
            "update devices set project_id = $2 \
             where device_id = $1 and project_id is null \
             returning {DEVICE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = row {
            return Ok(AssignOutcome::Assigned(device_from_row(&row)?));
        }
        let current = sqlx::query("select project_id from devices where device_id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(current) = current else {
            return Ok(AssignOutcome::NotFound);
        };
        let owner: Option<String> = current.try_get("project_id")?;
        match owner {
            Some(owner) if owner == project_id => Ok(AssignOutcome::AlreadyMember),
            Some(owner) => Ok(AssignOutcome::OwnedByOther(owner)),
            // 并发释放后的极短窗口，按未找到处理由调用方重试。
            None => Ok(AssignOutcome::NotFound),
        }
    }

    async fn release_project(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        project_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let sql = format!(
            "update devices set project_id = null \
             where device_id = $1 and project_id = $2 \
             returning {DEVICE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(device_id)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }
}
