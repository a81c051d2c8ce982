//! 存储接口 Trait 定义
//!
//! 定义所有资源存储的异步接口：
//! - DeviceStore：设备存储（含数据集提交、游标前进、项目归属等原子操作）
//! - ConnectionStore：连接存储
//! - ConnectionTestStore：连接测试记录
//! - ProjectStore：项目存储
//! - TransmissionHistoryStore：传输历史（只追加）
//!
//! 设计原则：
//! - 所有接口显式接收 SessionContext
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::{
    AssignOutcome, ConnectionRecord, ConnectionTestRecord, ConnectionUpdate, DeviceRecord,
    DeviceUpdate, HistoryFilter, HistoryScope, HistorySlice, ProjectOperationRecord,
    ProjectRecord, ProjectUpdate, TransmissionRecord,
};
use async_trait::async_trait;
use domain::{CsvDataset, ProjectTransmissionStatus, SessionContext};

/// 设备存储接口
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// 列出全部设备（按创建时间升序）
    async fn list_devices(&self, ctx: &SessionContext) -> Result<Vec<DeviceRecord>, StorageError>;

    /// 列出未分配到任何项目的设备
    async fn list_unassigned_devices(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<DeviceRecord>, StorageError>;

    /// 列出项目成员设备
    async fn list_project_devices(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<Vec<DeviceRecord>, StorageError>;

    /// 查找指定设备
    async fn find_device(
        &self,
        ctx: &SessionContext,
        device_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    /// 按 reference 查找设备
    async fn find_by_reference(
        &self,
        ctx: &SessionContext,
        reference: &str,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    /// 创建新设备（ID 或 reference 重复时报错）
    async fn create_device(
        &self,
        ctx: &SessionContext,
        record: DeviceRecord,
    ) -> Result<DeviceRecord, StorageError>;

    /// 更新设备
    async fn update_device(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        update: DeviceUpdate,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    /// 删除设备
    async fn delete_device(&self, ctx: &SessionContext, device_id: &str)
    -> Result<bool, StorageError>;

    /// 原子替换数据集，并按提交规则调整游标
    async fn commit_dataset(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        dataset: CsvDataset,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    /// 原子记录一次发送：写入 `last_transmission_ms`，`advance_cursor` 为 true 时游标前进一行
    async fn mark_transmitted(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        transmitted_at_ms: i64,
        advance_cursor: bool,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    /// 原子加入项目：仅当设备尚未属于任何项目时成功
    async fn assign_project(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        project_id: &str,
    ) -> Result<AssignOutcome, StorageError>;

    /// 从项目释放设备；设备不属于该项目时返回 None
    async fn release_project(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        project_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError>;
}

/// 连接存储接口
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn list_connections(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<ConnectionRecord>, StorageError>;

    async fn find_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, StorageError>;

    async fn create_connection(
        &self,
        ctx: &SessionContext,
        record: ConnectionRecord,
    ) -> Result<ConnectionRecord, StorageError>;

    async fn update_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
        update: ConnectionUpdate,
    ) -> Result<Option<ConnectionRecord>, StorageError>;

    async fn delete_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
    ) -> Result<bool, StorageError>;
}

/// 连接测试记录存储接口
#[async_trait]
pub trait ConnectionTestStore: Send + Sync {
    async fn record_test(
        &self,
        ctx: &SessionContext,
        record: ConnectionTestRecord,
    ) -> Result<ConnectionTestRecord, StorageError>;

    /// 最近的测试记录（新到旧）
    async fn list_tests(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
        limit: u64,
    ) -> Result<Vec<ConnectionTestRecord>, StorageError>;
}

/// 项目存储接口
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn list_projects(&self, ctx: &SessionContext) -> Result<Vec<ProjectRecord>, StorageError>;

    async fn find_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<Option<ProjectRecord>, StorageError>;

    async fn find_by_name(
        &self,
        ctx: &SessionContext,
        name: &str,
    ) -> Result<Option<ProjectRecord>, StorageError>;

    async fn create_project(
        &self,
        ctx: &SessionContext,
        record: ProjectRecord,
    ) -> Result<ProjectRecord, StorageError>;

    async fn update_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<Option<ProjectRecord>, StorageError>;

    async fn delete_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<bool, StorageError>;

    /// 写入推导出的项目传输状态（仅供批量编排调用）
    async fn set_transmission_status(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        status: ProjectTransmissionStatus,
    ) -> Result<Option<ProjectRecord>, StorageError>;
}

/// 传输历史存储接口
///
/// 只追加：不提供修改与删除。
#[async_trait]
pub trait TransmissionHistoryStore: Send + Sync {
    /// 追加一条传输记录
    async fn record(
        &self,
        ctx: &SessionContext,
        entry: TransmissionRecord,
    ) -> Result<TransmissionRecord, StorageError>;

    /// 过滤查询（新到旧），`limit = None` 表示不分页
    async fn query(
        &self,
        ctx: &SessionContext,
        scope: &HistoryScope,
        filter: &HistoryFilter,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<HistorySlice, StorageError>;

    /// 追加一条项目批量操作记录
    async fn record_operation(
        &self,
        ctx: &SessionContext,
        entry: ProjectOperationRecord,
    ) -> Result<ProjectOperationRecord, StorageError>;

    /// 项目批量操作记录（新到旧）
    async fn list_operations(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        limit: u64,
    ) -> Result<Vec<ProjectOperationRecord>, StorageError>;
}
