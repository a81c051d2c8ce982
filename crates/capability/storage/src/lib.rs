//! # devsim Storage 模块
//!
//! 本模块提供统一的数据存储抽象层，支持内存与 PostgreSQL 两种后端。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：定义所有资源存储的异步 Trait 接口
//! 2. **数据模型层** (`models.rs`)：定义存储相关的数据结构
//! 3. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 4. **验证辅助层** (`validation.rs`)：会话上下文与 ID 校验
//! 5. **连接管理层** (`connection.rs`)：数据库连接池与建表脚本
//! 6. **实现层**：
//!    - `in_memory/`：内存存储实现（测试与无数据库运行）
//!    - `postgres/`：PostgreSQL 存储实现
//!
//! ## 核心约束
//!
//! - **显式上下文**：所有数据访问方法必须显式接收 `SessionContext`
//! - **只追加历史**：`TransmissionHistoryStore` 不提供修改与删除
//! - **游标不变量**：`current_row_index < row_count`（`row_count > 0` 时），否则为 0；
//!   数据集提交与游标前进均由存储层原子完成
//! - **单项目归属**：设备最多属于一个项目，加入项目为条件更新
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use devsim_storage::{DeviceStore, InMemoryDeviceStore};
//! use domain::SessionContext;
//!
//! let store = InMemoryDeviceStore::new();
//! let ctx = SessionContext::for_actor("tester");
//! let devices = store.list_unassigned_devices(&ctx).await?;
//! ```

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod traits;
pub mod validation;

pub use connection::*;
pub use error::*;
pub use models::*;
pub use traits::*;
pub use validation::*;

pub use in_memory::{
    InMemoryConnectionStore, InMemoryConnectionTestStore, InMemoryDeviceStore,
    InMemoryHistoryStore, InMemoryProjectStore,
};

pub use postgres::{
    PgConnectionStore, PgConnectionTestStore, PgDeviceStore, PgHistoryStore, PgProjectStore,
};
