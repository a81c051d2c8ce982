//! 数据库连接管理
//!
//! 提供数据库连接池初始化功能：
//! - connect_pool：建立 Postgres 连接池
//! - ensure_schema：执行建表脚本（幂等）

use crate::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// 建立 Postgres 连接池
///
/// 从数据库 URL 创建连接池，最大连接数限制为 8。
pub async fn connect_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// 执行建表脚本
///
/// 所有语句均为 `if not exists`，可在每次启动时执行。
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
