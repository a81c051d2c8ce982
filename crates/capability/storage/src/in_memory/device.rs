//! 设备内存存储实现
//!
//! 功能：
//! - 设备 CRUD 操作
//! - 数据集提交、游标前进与项目归属在同一把写锁内完成

use crate::error::StorageError;
use crate::models::{AssignOutcome, DeviceRecord, DeviceUpdate};
use crate::traits::DeviceStore;
use crate::validation::{ensure_id, ensure_session};
use domain::{CsvDataset, SessionContext};
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
#[derive(Default)]
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl InMemoryDeviceStore {
    /// 创建新的设备存储
    pub fn new() -> Self {
        Self::default()
    }

    fn collect<F>(&self, filter: F) -> Vec<DeviceRecord>
    where
        F: Fn(&DeviceRecord) -> bool,
    {
        let mut items: Vec<DeviceRecord> = self
            .devices
            .read()
            .map(|map| map.values().filter(|item| filter(item)).cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.name.cmp(&b.name))
        });
        items
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn list_devices(&self, ctx: &SessionContext) -> Result<Vec<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        Ok(self.collect(|_| true))
    }

    async fn list_unassigned_devices(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        Ok(self.collect(|item| item.project_id.is_none()))
    }

    async fn list_project_devices(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<Vec<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        Ok(self.collect(|item| item.project_id.as_deref() == Some(project_id)))
    }

    async fn find_device(
        &self,
        ctx: &SessionContext,
        device_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let item = self
            .devices
            .read()
            .ok()
            .and_then(|map| map.get(device_id).cloned());
        Ok(item)
    }

    async fn find_by_reference(
        &self,
        ctx: &SessionContext,
        reference: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let item = self.devices.read().ok().and_then(|map| {
            map.values()
                .find(|item| item.reference == reference)
                .cloned()
        });
        Ok(item)
    }

    async fn create_device(
        &self,
        ctx: &SessionContext,
        record: DeviceRecord,
    ) -> Result<DeviceRecord, StorageError> {
        ensure_session(ctx)?;
        ensure_id(&record.device_id, "device_id")?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if map.contains_key(&record.device_id) {
            return Err(StorageError::new("device exists"));
        }
        if map.values().any(|item| item.reference == record.reference) {
            return Err(StorageError::new("device reference exists"));
        }
        map.insert(record.device_id.clone(), record.clone());
        Ok(record)
    }

    async fn update_device(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        update: DeviceUpdate,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let device = match map.get_mut(device_id) {
            Some(device) => device,
            None => return Ok(None),
        };
        if let Some(name) = update.name {
            device.name = name;
        }
        if let Some(description) = update.description {
            device.description = description;
        }
        if let Some(device_type) = update.device_type {
            device.device_type = device_type;
        }
        if let Some(frequency) = update.transmission_frequency {
            device.transmission_frequency = frequency;
        }
        if let Some(state) = update.transmission_state {
            device.transmission_state = state;
        }
        if let Some(connection_id) = update.selected_connection_id {
            device.selected_connection_id = connection_id;
        }
        if let Some(index) = update.current_row_index {
            let rows = device.row_count();
            device.current_row_index = if rows == 0 || index as usize >= rows {
                0
            } else {
                index
            };
        }
        if let Some(ts_ms) = update.last_transmission_ms {
            device.last_transmission_ms = Some(ts_ms);
        }
        Ok(Some(device.clone()))
    }

    async fn delete_device(
        &self,
        ctx: &SessionContext,
        device_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_session(ctx)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(device_id).is_some())
    }

    async fn commit_dataset(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        dataset: CsvDataset,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(device) = map.get_mut(device_id) else {
            return Ok(None);
        };
        device.apply_dataset(dataset);
        Ok(Some(device.clone()))
    }

    async fn mark_transmitted(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        transmitted_at_ms: i64,
        advance_cursor: bool,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(device) = map.get_mut(device_id) else {
            return Ok(None);
        };
        if advance_cursor {
            device.advance_cursor();
        }
        device.last_transmission_ms = Some(transmitted_at_ms);
        Ok(Some(device.clone()))
    }

    async fn assign_project(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        project_id: &str,
    ) -> Result<AssignOutcome, StorageError> {
        ensure_session(ctx)?;
        ensure_id(project_id, "project_id")?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(device) = map.get_mut(device_id) else {
            return Ok(AssignOutcome::NotFound);
        };
        match device.project_id.as_deref() {
            Some(current) if current == project_id => Ok(AssignOutcome::AlreadyMember),
            Some(current) => Ok(AssignOutcome::OwnedByOther(current.to_string())),
            None => {
                device.project_id = Some(project_id.to_string());
                Ok(AssignOutcome::Assigned(device.clone()))
            }
        }
    }

    async fn release_project(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        project_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match map.get_mut(device_id) {
            Some(device) if device.project_id.as_deref() == Some(project_id) => {
                device.project_id = None;
                Ok(Some(device.clone()))
            }
            _ => Ok(None),
        }
    }
}
