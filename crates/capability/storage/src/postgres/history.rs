//! Postgres 传输历史实现
//!
//! 只追加；排序为 `ts desc, seq desc`，同一时间戳下后写入者在前。

use crate::error::StorageError;
use crate::models::{
    HistoryFilter, HistoryScope, HistorySlice, ProjectOperationRecord, TransmissionRecord,
};
use crate::postgres::{parse_column, to_i32, to_u32};
use crate::traits::TransmissionHistoryStore;
use crate::validation::ensure_session;
use domain::{BulkOperation, SessionContext, TransmissionStatus, TransmissionType};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const HISTORY_FILTER: &str = "($1::text is null or device_id = $1) \
     and ($2::text is null or project_id = $2) \
     and ($3::text is null or status = $3) \
     and ($4::text is null or connection_id = $4)";

pub struct PgHistoryStore {
    pub pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn scope_binds(scope: &HistoryScope) -> (Option<&str>, Option<&str>) {
    match scope {
        HistoryScope::Device(device_id) => (Some(device_id.as_str()), None),
        HistoryScope::Project(project_id) => (None, Some(project_id.as_str())),
    }
}

fn record_from_row(row: &PgRow) -> Result<TransmissionRecord, StorageError> {
    let status: String = row.try_get("status")?;
    let kind: String = row.try_get("transmission_type")?;
    let row_index: Option<i32> = row.try_get("row_index")?;
    let response_time_ms: Option<i64> = row.try_get("response_time_ms")?;
    Ok(TransmissionRecord {
        transmission_id: row.try_get("transmission_id")?,
        device_id: row.try_get("device_id")?,
        device_name: row.try_get("device_name")?,
        device_reference: row.try_get("device_reference")?,
        project_id: row.try_get("project_id")?,
        connection_id: row.try_get("connection_id")?,
        connection_name: row.try_get("connection_name")?,
        status: parse_column(&status, "status", TransmissionStatus::parse)?,
        transmission_type: parse_column(&kind, "transmission_type", TransmissionType::parse)?,
        row_index: row_index.map(to_u32),
        timestamp_ms: row.try_get("ts_ms")?,
        response_time_ms: response_time_ms.map(|value| value.max(0) as u64),
        error_message: row.try_get("error_message")?,
    })
}

#[async_trait::async_trait]
impl TransmissionHistoryStore for PgHistoryStore {
    async fn record(
        &self,
        ctx: &SessionContext,
        entry: TransmissionRecord,
    ) -> Result<TransmissionRecord, StorageError> {
        ensure_session(ctx)?;
        sqlx::query(
            "insert into transmission_records \
             (transmission_id, device_id, device_name, device_reference, project_id, \
              connection_id, connection_name, status, transmission_type, row_index, ts, \
              response_time_ms, error_message) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, to_timestamp($11 / 1000.0), \
                     $12, $13)",
        )
        .bind(&entry.transmission_id)
        .bind(&entry.device_id)
        .bind(&entry.device_name)
        .bind(&entry.device_reference)
        .bind(&entry.project_id)
        .bind(&entry.connection_id)
        .bind(&entry.connection_name)
        .bind(entry.status.as_str())
        .bind(entry.transmission_type.as_str())
        .bind(entry.row_index.map(to_i32))
        .bind(entry.timestamp_ms as f64)
        .bind(entry.response_time_ms.map(|value| value as i64))
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn query(
        &self,
        ctx: &SessionContext,
        scope: &HistoryScope,
        filter: &HistoryFilter,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<HistorySlice, StorageError> {
        ensure_session(ctx)?;
        let (device_id, project_id) = scope_binds(scope);
        let status = filter.status.map(|value| value.as_str());
        let connection_id = filter.connection_id.as_deref();

        let count_sql =
            format!("select count(*) as total from transmission_records where {HISTORY_FILTER}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(device_id)
            .bind(project_id)
            .bind(status)
            .bind(connection_id)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        // limit 为 null 时 Postgres 不限制行数。
        let sql = format!(
            "select transmission_id, device_id, device_name, device_reference, project_id, \
             connection_id, connection_name, status, transmission_type, row_index, \
             (extract(epoch from ts) * 1000)::bigint as ts_ms, response_time_ms, error_message \
             from transmission_records \
             where {HISTORY_FILTER} \
             order by ts desc, seq desc \
             limit $5 offset $6"
        );
        let rows = sqlx::query(&sql)
            .bind(device_id)
            .bind(project_id)
            .bind(status)
            .bind(connection_id)
            .bind(limit.map(|value| value as i64))
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HistorySlice {
            records,
            total: total.max(0) as u64,
        })
    }

    async fn record_operation(
        &self,
        ctx: &SessionContext,
        entry: ProjectOperationRecord,
    ) -> Result<ProjectOperationRecord, StorageError> {
        ensure_session(ctx)?;
        sqlx::query(
            "insert into project_operations \
             (operation_id, project_id, operation, actor, connection_id, total_devices, \
              successful_operations, failed_operations, ts) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, to_timestamp($9 / 1000.0))",
        )
        .bind(&entry.operation_id)
        .bind(&entry.project_id)
        .bind(entry.operation.as_str())
        .bind(&entry.actor)
        .bind(&entry.connection_id)
        .bind(to_i32(entry.total_devices))
        .bind(to_i32(entry.successful_operations))
        .bind(to_i32(entry.failed_operations))
        .bind(entry.ts_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn list_operations(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        limit: u64,
    ) -> Result<Vec<ProjectOperationRecord>, StorageError> {
        ensure_session(ctx)?;
        let rows = sqlx::query(
            "select operation_id, project_id, operation, actor, connection_id, total_devices, \
             successful_operations, failed_operations, \
             (extract(epoch from ts) * 1000)::bigint as ts_ms \
             from project_operations \
             where project_id = $1 \
             order by ts desc \
             limit $2",
        )
        .bind(project_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let operation: String = row.try_get("operation")?;
            items.push(ProjectOperationRecord {
                operation_id: row.try_get("operation_id")?,
                project_id: row.try_get("project_id")?,
                operation: parse_column(&operation, "operation", BulkOperation::parse)?,
                actor: row.try_get("actor")?,
                connection_id: row.try_get("connection_id")?,
                total_devices: to_u32(row.try_get("total_devices")?),
                successful_operations: to_u32(row.try_get("successful_operations")?),
                failed_operations: to_u32(row.try_get("failed_operations")?),
                ts_ms: row.try_get("ts_ms")?,
            });
        }
        Ok(items)
    }
}
