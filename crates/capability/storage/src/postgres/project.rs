//! Postgres 项目存储实现

use crate::error::StorageError;
use crate::models::{ProjectRecord, ProjectUpdate};
use crate::postgres::parse_column;
use crate::traits::ProjectStore;
use crate::validation::{ensure_id, ensure_session};
use domain::{ProjectTransmissionStatus, SessionContext};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const PROJECT_COLUMNS: &str = "project_id, name, description, transmission_status, \
     (extract(epoch from created_at) * 1000)::bigint as created_at_ms";

pub struct PgProjectStore {
    pub pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn project_from_row(row: &PgRow) -> Result<ProjectRecord, StorageError> {
    let status: String = row.try_get("transmission_status")?;
    Ok(ProjectRecord {
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        transmission_status: parse_column(
            &status,
            "transmission_status",
            ProjectTransmissionStatus::parse,
        )?,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

#[async_trait::async_trait]
impl ProjectStore for PgProjectStore {
    async fn list_projects(&self, ctx: &SessionContext) -> Result<Vec<ProjectRecord>, StorageError> {
        ensure_session(ctx)?;
        let sql = format!("select {PROJECT_COLUMNS} from projects order by created_at");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(project_from_row).collect()
    }

    async fn find_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<Option<ProjectRecord>, StorageError> {
        ensure_session(ctx)?;
        let sql = format!("select {PROJECT_COLUMNS} from projects where project_id = $1");
        let row = sqlx::query(&sql)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn find_by_name(
        &self,
        ctx: &SessionContext,
        name: &str,
    ) -> Result<Option<ProjectRecord>, StorageError> {
        ensure_session(ctx)?;
        let sql = format!("select {PROJECT_COLUMNS} from projects where name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn create_project(
        &self,
        ctx: &SessionContext,
        record: ProjectRecord,
    ) -> Result<ProjectRecord, StorageError> {
        ensure_session(ctx)?;
        ensure_id(&record.project_id, "project_id")?;
        sqlx::query(
            "insert into projects \
             (project_id, name, description, transmission_status, created_at) \
             values ($1, $2, $3, $4, to_timestamp($5 / 1000.0))",
        )
        .bind(&record.project_id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.transmission_status.as_str())
        .bind(record.created_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<Option<ProjectRecord>, StorageError> {
        ensure_session(ctx)?;
        let sql = format!(
            "update projects set \
             name = coalesce($2, name), \
             description = case when $3 then $4 else description end \
             where project_id = $1 \
             returning {PROJECT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(project_id)
            .bind(update.name)
            .bind(update.description.is_some())
            .bind(update.description.flatten())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn delete_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_session(ctx)?;
        let result = sqlx::query("delete from projects where project_id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_transmission_status(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        status: ProjectTransmissionStatus,
    ) -> Result<Option<ProjectRecord>, StorageError> {
        ensure_session(ctx)?;
        let sql = format!(
            "update projects set transmission_status = $2 \
             where project_id = $1 \
             returning {PROJECT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(project_id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }
}
