//! 连接内存存储实现

use crate::error::StorageError;
use crate::models::{ConnectionRecord, ConnectionTestRecord, ConnectionUpdate};
use crate::traits::{ConnectionStore, ConnectionTestStore};
use crate::validation::{ensure_id, ensure_session};
use domain::SessionContext;
use std::collections::HashMap;
use std::sync::RwLock;

/// 连接内存存储
#[derive(Default)]
pub struct InMemoryConnectionStore {
    connections: RwLock<HashMap<String, ConnectionRecord>>,
}

impl InMemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn list_connections(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<ConnectionRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut items: Vec<ConnectionRecord> = self
            .connections
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
        Ok(items)
    }

    async fn find_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, StorageError> {
        ensure_session(ctx)?;
        let item = self
            .connections
            .read()
            .ok()
            .and_then(|map| map.get(connection_id).cloned());
        Ok(item)
    }

    async fn create_connection(
        &self,
        ctx: &SessionContext,
        record: ConnectionRecord,
    ) -> Result<ConnectionRecord, StorageError> {
        ensure_session(ctx)?;
        ensure_id(&record.connection_id, "connection_id")?;
        let mut map = self
            .connections
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if map.contains_key(&record.connection_id) {
            return Err(StorageError::new("connection exists"));
        }
        map.insert(record.connection_id.clone(), record.clone());
        Ok(record)
    }

    async fn update_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
        update: ConnectionUpdate,
    ) -> Result<Option<ConnectionRecord>, StorageError> {
        ensure_session(ctx)?;
        let mut map = self
            .connections
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(connection) = map.get_mut(connection_id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            connection.name = name;
        }
        if let Some(description) = update.description {
            connection.description = description;
        }
        if let Some(host) = update.host {
            connection.host = host;
        }
        if let Some(port) = update.port {
            connection.port = port;
        }
        if let Some(endpoint) = update.endpoint {
            connection.endpoint = endpoint;
        }
        if let Some(auth) = update.auth {
            connection.auth = auth;
        }
        if let Some(settings) = update.settings {
            connection.settings = settings;
        }
        if let Some(is_active) = update.is_active {
            connection.is_active = is_active;
        }
        Ok(Some(connection.clone()))
    }

    async fn delete_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
    ) -> Result<bool, StorageError> {
        ensure_session(ctx)?;
        let mut map = self
            .connections
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(connection_id).is_some())
    }
}

/// 连接测试记录内存存储
#[derive(Default)]
pub struct InMemoryConnectionTestStore {
    tests: RwLock<Vec<ConnectionTestRecord>>,
}

impl InMemoryConnectionTestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConnectionTestStore for InMemoryConnectionTestStore {
    async fn record_test(
        &self,
        ctx: &SessionContext,
        record: ConnectionTestRecord,
    ) -> Result<ConnectionTestRecord, StorageError> {
        ensure_session(ctx)?;
        let mut tests = self
            .tests
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        tests.push(record.clone());
        Ok(record)
    }

    async fn list_tests(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
        limit: u64,
    ) -> Result<Vec<ConnectionTestRecord>, StorageError> {
        ensure_session(ctx)?;
        let tests = self
            .tests
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<ConnectionTestRecord> = tests
            .iter()
            .rev()
            .filter(|item| item.connection_id == connection_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.ts_ms.cmp(&a.ts_ms));
        items.truncate(limit as usize);
        Ok(items)
    }
}
