//! Postgres 连接与连接测试存储实现
//!
//! 认证配置与连接参数以 JSON 文本列保存。

use crate::error::StorageError;
use crate::models::{ConnectionRecord, ConnectionTestRecord, ConnectionUpdate};
use crate::traits::{ConnectionStore, ConnectionTestStore};
use crate::validation::{ensure_id, ensure_session};
use domain::{AuthConfig, ConnectionSettings, SessionContext};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const CONNECTION_COLUMNS: &str = "connection_id, name, description, host, port, endpoint, \
     auth_config, connection_config, is_active, \
     (extract(epoch from created_at) * 1000)::bigint as created_at_ms";

pub struct PgConnectionStore {
    pub pool: PgPool,
}

impl PgConnectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn connection_from_row(row: &PgRow) -> Result<ConnectionRecord, StorageError> {
    let auth: String = row.try_get("auth_config")?;
    let settings: String = row.try_get("connection_config")?;
    let port: Option<i32> = row.try_get("port")?;
    Ok(ConnectionRecord {
        connection_id: row.try_get("connection_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        host: row.try_get("host")?,
        port: port.and_then(|value| u16::try_from(value).ok()),
        endpoint: row.try_get("endpoint")?,
        auth: serde_json::from_str::<AuthConfig>(&auth)?,
        settings: serde_json::from_str::<ConnectionSettings>(&settings)?,
        is_active: row.try_get("is_active")?,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

#[async_trait::async_trait]
impl ConnectionStore for PgConnectionStore {
    async fn list_connections(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<ConnectionRecord>, StorageError> {
        ensure_session(ctx)?;
        let sql = format!("select {CONNECTION_COLUMNS} from connections order by created_at");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(connection_from_row).collect()
    }

    async fn find_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, StorageError> {
        ensure_session(ctx)?;
        let sql = format!("select {CONNECTION_COLUMNS} from connections where connection_id = $1");
        let row = sqlx::query(&sql)
            .bind(connection_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(connection_from_row).transpose()
    }

    async fn create_connection(
        &self,
        ctx: &SessionContext,
        record: ConnectionRecord,
    ) -> Result<ConnectionRecord, StorageError> {
        ensure_session(ctx)?;
        ensure_id(&record.connection_id, "connection_id")?;
        sqlx::query(
            "insert into connections \
             (connection_id, name, description, host, port, endpoint, auth_config, \
              connection_config, is_active, created_at) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, to_timestamp($10 / 1000.0))",
        )
        .bind(&record.connection_id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.host)
        .bind(record.port.map(i32::from))
        .bind(&record.endpoint)
        .bind(serde_json::to_string(&record.auth)?)
        .bind(serde_json::to_string(&record.settings)?)
        .bind(record.is_active)
        .bind(record.created_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
        update: ConnectionUpdate,
    ) -> Result<Option<ConnectionRecord>, StorageError> {
        ensure_session(ctx)?;
        let auth = update.auth.as_ref().map(serde_json::to_string).transpose()?;
        let settings = update
            .settings
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let sql = format!(
            "update connections set \
             name = coalesce($2, name), \
             description = case when $3 then $4 else description end, \
             host = coalesce($5, host), \
             port = case when $6 then $7 else port end, \
             endpoint = coalesce($8, endpoint), \
             auth_config = coalesce($9, auth_config), \
             connection_config = coalesce($10, connection_config), \
             is_active = coalesce($11, is_active) \
             where connection_id = $1 \
             returning {CONNECTION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(connection_id)
            .bind(update.name)
            .bind(update.description.is_some())
            .bind(update.description.flatten())
            .bind(update.host)
            .bind(update.port.is_some())
            .bind(update.port.flatten().map(i32::from))
            .bind(update.endpoint)
            .bind(auth)
            .bind(settings)
            .bind(update.is_active)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(connection_from_row).transpose()
    }

    async fn delete_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_session(ctx)?;
        let result = sqlx::query("delete from connections where connection_id = $1")
            .bind(connection_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct PgConnectionTestStore {
    pub pool: PgPool,
}

impl PgConnectionTestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConnectionTestStore for PgConnectionTestStore {
    async fn record_test(
        &self,
        ctx: &SessionContext,
        record: ConnectionTestRecord,
    ) -> Result<ConnectionTestRecord, StorageError> {
        ensure_session(ctx)?;
        sqlx::query(
            "insert into connection_tests \
             (test_id, connection_id, success, response_time_ms, message, ts) \
             values ($1, $2, $3, $4, $5, to_timestamp($6 / 1000.0))",
        )
        .bind(&record.test_id)
        .bind(&record.connection_id)
        .bind(record.success)
        .bind(record.response_time_ms as i64)
        .bind(&record.message)
        .bind(record.ts_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_tests(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
        limit: u64,
    ) -> Result<Vec<ConnectionTestRecord>, StorageError> {
        ensure_session(ctx)?;
        let rows = sqlx::query(
            "select test_id, connection_id, success, response_time_ms, message, \
             (extract(epoch from ts) * 1000)::bigint as ts_ms \
             from connection_tests \
             where connection_id = $1 \
             order by ts desc \
             limit $2",
        )
        .bind(connection_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let response_time_ms: i64 = row.try_get("response_time_ms")?;
            items.push(ConnectionTestRecord {
                test_id: row.try_get("test_id")?,
                connection_id: row.try_get("connection_id")?,
                success: row.try_get("success")?,
                response_time_ms: response_time_ms.max(0) as u64,
                message: row.try_get("message")?,
                ts_ms: row.try_get("ts_ms")?,
            });
        }
        Ok(items)
    }
}
