#![allow(dead_code)]

use async_trait::async_trait;
use devsim_storage::{
    ConnectionRecord, ConnectionStore, DeviceRecord, DeviceStore, HistoryFilter, HistoryScope,
    HistorySlice, InMemoryConnectionStore, InMemoryDeviceStore, InMemoryHistoryStore,
    InMemoryProjectStore, ProjectOperationRecord, StorageError, TransmissionHistoryStore,
    TransmissionRecord,
};
use devsim_transmission::{
    ControllerConfig, ControllerStores, DeviceTransmissionController, HistoryConfig,
    ProjectTransmissionOrchestrator, TransmissionHistoryService,
};
use devsim_transport::{Transport, TransportError, TransportReceipt};
use domain::{
    AuthConfig, ConnectionSettings, CsvDataset, DeviceType, HttpsSettings, SessionContext,
    TransmissionState,
};
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ctx() -> SessionContext {
    SessionContext::for_actor("tester")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Succeed,
    Fail,
    Hang,
}

/// 可控的传输替身：记录每次投递的负载。
pub struct MockTransport {
    behaviour: Mutex<Behaviour>,
    sent: Mutex<Vec<Value>>,
}

impl MockTransport {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour: Mutex::new(behaviour),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, behaviour: Behaviour) {
        *self.behaviour.lock().expect("lock") = behaviour;
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        _connection: &ConnectionRecord,
        payload: &Value,
    ) -> Result<TransportReceipt, TransportError> {
        self.sent.lock().expect("lock").push(payload.clone());
        let behaviour = *self.behaviour.lock().expect("lock");
        match behaviour {
            Behaviour::Succeed => Ok(TransportReceipt::new("HTTP 200")),
            Behaviour::Fail => Err(TransportError::HttpStatus(503)),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(TransportReceipt::new("late"))
            }
        }
    }

    async fn test(&self, _connection: &ConnectionRecord) -> Result<String, TransportError> {
        Ok("reachable".to_string())
    }
}

/// 写入总是失败的历史存储。
pub struct UnavailableHistory;

#[async_trait]
impl TransmissionHistoryStore for UnavailableHistory {
    async fn record(
        &self,
        _ctx: &SessionContext,
        _record: TransmissionRecord,
    ) -> Result<TransmissionRecord, StorageError> {
        Err(StorageError::new("history unavailable"))
    }

    async fn query(
        &self,
        _ctx: &SessionContext,
        _scope: &HistoryScope,
        _filter: &HistoryFilter,
        _offset: u64,
        _limit: Option<u64>,
    ) -> Result<HistorySlice, StorageError> {
        Ok(HistorySlice::default())
    }

    async fn record_operation(
        &self,
        _ctx: &SessionContext,
        _record: ProjectOperationRecord,
    ) -> Result<ProjectOperationRecord, StorageError> {
        Err(StorageError::new("history unavailable"))
    }

    async fn list_operations(
        &self,
        _ctx: &SessionContext,
        _project_id: &str,
        _limit: u64,
    ) -> Result<Vec<ProjectOperationRecord>, StorageError> {
        Ok(Vec::new())
    }
}

pub struct Harness {
    pub devices: Arc<InMemoryDeviceStore>,
    pub connections: Arc<InMemoryConnectionStore>,
    pub history: Arc<InMemoryHistoryStore>,
    pub projects: Arc<InMemoryProjectStore>,
    pub transport: Arc<MockTransport>,
    pub controller: DeviceTransmissionController,
    pub orchestrator: ProjectTransmissionOrchestrator,
    pub history_service: TransmissionHistoryService,
}

impl Harness {
    pub fn new() -> Self {
        let devices = Arc::new(InMemoryDeviceStore::new());
        let connections = Arc::new(InMemoryConnectionStore::new());
        let history = Arc::new(InMemoryHistoryStore::new());
        let projects = Arc::new(InMemoryProjectStore::new());
        let transport = Arc::new(MockTransport::new(Behaviour::Succeed));
        let controller = DeviceTransmissionController::new(
            ControllerStores {
                device_store: devices.clone(),
                connection_store: connections.clone(),
                history_store: history.clone(),
            },
            transport.clone(),
            ControllerConfig {
                mqtt_timeout: Duration::from_millis(500),
            },
        );
        let orchestrator = ProjectTransmissionOrchestrator::new(
            projects.clone(),
            devices.clone(),
            history.clone(),
            controller.clone(),
        );
        let history_service = TransmissionHistoryService::new(
            history.clone(),
            devices.clone(),
            projects.clone(),
            HistoryConfig::default(),
        );
        Self {
            devices,
            connections,
            history,
            projects,
            transport,
            controller,
            orchestrator,
            history_service,
        }
    }

    /// 共享设备、连接与传输，但使用另一个历史存储的控制器。
    pub fn controller_with_history(
        &self,
        history: Arc<dyn TransmissionHistoryStore>,
    ) -> DeviceTransmissionController {
        DeviceTransmissionController::new(
            ControllerStores {
                device_store: self.devices.clone(),
                connection_store: self.connections.clone(),
                history_store: history,
            },
            self.transport.clone(),
            ControllerConfig {
                mqtt_timeout: Duration::from_millis(500),
            },
        )
    }

    /// 新增设备；`rows == 0` 表示没有数据集。
    pub async fn add_device(&self, device_id: &str, device_type: DeviceType, rows: usize) -> DeviceRecord {
        let record = DeviceRecord {
            device_id: device_id.to_string(),
            reference: format!("R{:0>7}", device_id.to_ascii_uppercase()),
            name: format!("device {device_id}"),
            description: None,
            device_type,
            transmission_frequency: 1,
            transmission_state: TransmissionState::Inactive,
            selected_connection_id: None,
            current_row_index: 0,
            csv_data: None,
            project_id: None,
            last_transmission_ms: None,
            created_at_ms: 1,
        };
        self.devices.create_device(&ctx(), record.clone()).await.expect("create device");
        if rows == 0 {
            return record;
        }
        self.devices
            .commit_dataset(&ctx(), device_id, dataset(rows))
            .await
            .expect("commit")
            .expect("device")
    }

    pub async fn add_connection(&self, connection_id: &str, is_active: bool) -> ConnectionRecord {
        let record = ConnectionRecord {
            connection_id: connection_id.to_string(),
            name: format!("conn {connection_id}"),
            description: None,
            host: "api.example.com".to_string(),
            port: None,
            endpoint: "/ingest".to_string(),
            auth: AuthConfig::None,
            settings: ConnectionSettings::Https(HttpsSettings {
                timeout_seconds: 1,
                ..HttpsSettings::default()
            }),
            is_active,
            created_at_ms: 1,
        };
        self.connections
            .create_connection(&ctx(), record)
            .await
            .expect("create connection")
    }

    pub async fn device(&self, device_id: &str) -> DeviceRecord {
        self.devices
            .find_device(&ctx(), device_id)
            .await
            .expect("find")
            .expect("device")
    }

    pub async fn records(&self, device_id: &str) -> Vec<TransmissionRecord> {
        self.history
            .query(
                &ctx(),
                &HistoryScope::Device(device_id.to_string()),
                &HistoryFilter::default(),
                0,
                None,
            )
            .await
            .expect("query")
            .records
    }
}

pub fn dataset(rows: usize) -> CsvDataset {
    let data: Vec<Map<String, Value>> = (0..rows)
        .map(|index| {
            let mut row = Map::new();
            row.insert("reading".to_string(), json!(format!("r{index}")));
            row
        })
        .collect();
    CsvDataset {
        headers: vec!["reading".to_string()],
        csv_preview: Vec::new(),
        json_preview: data.iter().take(5).cloned().collect(),
        total_rows: rows,
        data,
    }
}
