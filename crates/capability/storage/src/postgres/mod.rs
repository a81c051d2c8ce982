//! # PostgreSQL 存储实现模块
//!
//! 本模块提供所有存储接口的 PostgreSQL 实现。
//!
//! ## 设计原则
//!
//! 1. **参数化查询**：所有 SQL 查询使用参数绑定，禁止字符串拼接用户输入
//! 2. **单语句原子更新**：数据集提交、游标前进、项目归属均为单条 `update ... returning`
//! 3. **连接池管理**：使用连接池复用数据库连接
//!
//! ## 包含的实现
//!
//! - **DeviceStore** (`device.rs`)
//! - **ConnectionStore / ConnectionTestStore** (`connection.rs`)
//! - **ProjectStore** (`project.rs`)
//! - **TransmissionHistoryStore** (`history.rs`)
//!
//! ## 数据库模式
//!
//! 见 `migrations/0001_init.sql`。枚举以文本存储，配置与数据集以 JSON 文本存储，
//! 时间戳以 `timestamptz` 存储、以毫秒读写。

pub mod connection;
pub mod device;
pub mod history;
pub mod project;

pub use connection::*;
pub use device::*;
pub use history::*;
pub use project::*;

use crate::error::StorageError;

/// 将文本列解析为枚举。
pub(crate) fn parse_column<T>(
    value: &str,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, StorageError> {
    parse(value).ok_or_else(|| StorageError::new(format!("invalid {column}: {value}")))
}

pub(crate) fn to_u32(value: i32) -> u32 {
    value.max(0) as u32
}

pub(crate) fn to_i32(value: u32) -> i32 {
    value.min(i32::MAX as u32) as i32
}
