//! 传输历史内存存储实现
//!
//! 只追加的 Vec；查询时按时间倒序，同一时间戳按写入倒序。

use crate::error::StorageError;
use crate::models::{
    HistoryFilter, HistoryScope, HistorySlice, ProjectOperationRecord, TransmissionRecord,
};
use crate::traits::TransmissionHistoryStore;
use crate::validation::ensure_session;
use domain::SessionContext;
use std::sync::RwLock;

/// 传输历史内存存储
#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<Vec<TransmissionRecord>>,
    operations: RwLock<Vec<ProjectOperationRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TransmissionHistoryStore for InMemoryHistoryStore {
    async fn record(
        &self,
        ctx: &SessionContext,
        entry: TransmissionRecord,
    ) -> Result<TransmissionRecord, StorageError> {
        ensure_session(ctx)?;
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        records.push(entry.clone());
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
        let mut matched: Vec<TransmissionRecord> = {
            let records = self
                .records
                .read()
                .map_err(|_| StorageError::new("lock failed"))?;
            records
                .iter()
                .rev()
                .filter(|item| scope.matches(item) && filter.matches(item))
                .cloned()
                .collect()
        };
        matched.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        let total = matched.len() as u64;
        let records = matched
            .into_iter()
            .skip(offset as usize)
            .take(limit.map(|value| value as usize).unwrap_or(usize::MAX))
            .collect();
        Ok(HistorySlice { records, total })
    }

    async fn record_operation(
        &self,
        ctx: &SessionContext,
        entry: ProjectOperationRecord,
    ) -> Result<ProjectOperationRecord, StorageError> {
        ensure_session(ctx)?;
        let mut operations = self
            .operations
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        operations.push(entry.clone());
        Ok(entry)
    }

    async fn list_operations(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        limit: u64,
    ) -> Result<Vec<ProjectOperationRecord>, StorageError> {
        ensure_session(ctx)?;
        let operations = self
            .operations
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<ProjectOperationRecord> = operations
            .iter()
            .rev()
            .filter(|item| item.project_id == project_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.ts_ms.cmp(&a.ts_ms));
        items.truncate(limit as usize);
        Ok(items)
    }
}
