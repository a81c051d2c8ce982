//! 项目内存存储实现
//!
//! 功能：
//! - 项目 CRUD 操作（名称唯一）
//! - 推导传输状态的写入

use crate::error::StorageError;
use crate::models::{ProjectRecord, ProjectUpdate};
use crate::traits::ProjectStore;
use crate::validation::{ensure_id, ensure_session};
use domain::{ProjectTransmissionStatus, SessionContext};
use std::collections::HashMap;
use std::sync::RwLock;

/// 项目内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
#[derive(Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<String, ProjectRecord>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn list_projects(&self, ctx: &SessionContext) -> Result<Vec<ProjectRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut projects: Vec<ProjectRecord> = self
            .projects
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        projects.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
        Ok(projects)
    }

    async fn find_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<Option<ProjectRecord>, StorageError> {
        ensure_session(ctx)?;
        let project = self
            .projects
            .read()
            .ok()
            .and_then(|map| map.get(project_id).cloned());
        Ok(project)
    }

    async fn find_by_name(
        &self,
        ctx: &SessionContext,
        name: &str,
    ) -> Result<Option<ProjectRecord>, StorageError> {
        ensure_session(ctx)?;
        let project = self
            .projects
            .read()
            .ok()
            .and_then(|map| map.values().find(|item| item.name == name).cloned());
        Ok(project)
    }

    async fn create_project(
        &self,
        ctx: &SessionContext,
        record: ProjectRecord,
    ) -> Result<ProjectRecord, StorageError> {
        ensure_session(ctx)?;
        ensure_id(&record.project_id, "project_id")?;
        let mut map = self
            .projects
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if map.contains_key(&record.project_id) {
            return Err(StorageError::new("project exists"));
        }
        if map.values().any(|item| item.name == record.name) {
            return Err(StorageError::new("project name exists"));
        }
        map.insert(record.project_id.clone(), record.clone());
        Ok(record)
    }

    async fn update_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<Option<ProjectRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut map = self
            .projects
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(name) = update.name.as_deref()
            && map
                .values()
                .any(|item| item.name == name && item.project_id != project_id)
        {
            return Err(StorageError::new("project name exists"));
        }
        let Some(project) = map.get_mut(project_id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            project.name = name;
        }
        if let Some(description) = update.description {
            project.description = description;
        }
        Ok(Some(project.clone()))
    }

    async fn delete_project(
        &self,
        ctx: &SessionContext,
        project_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_session(ctx)?;
        let mut map = self
            .projects
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(project_id).is_some())
    }

    async fn set_transmission_status(
        &self,
        ctx: &SessionContext,
        project_id: &str,
        status: ProjectTransmissionStatus,
    ) -> Result<Option<ProjectRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut map = self
            .projects
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get_mut(project_id).map(|project| {
            project.transmission_status = status;
            project.clone()
        }))
    }
}
