//! devsim HTTP API：设备、连接、项目与传输生命周期。

mod handlers;
mod middleware;
mod routes;
mod utils;

use devsim_config::AppConfig;
use devsim_ingest::{CsvIngestionPipeline, IngestConfig};
use devsim_storage::{
    ConnectionStore, ConnectionTestStore, DeviceStore, InMemoryConnectionStore,
    InMemoryConnectionTestStore, InMemoryDeviceStore, InMemoryHistoryStore, InMemoryProjectStore,
    PgConnectionStore, PgConnectionTestStore, PgDeviceStore, PgHistoryStore, PgProjectStore,
    ProjectStore, TransmissionHistoryStore, connect_pool, ensure_schema,
};
use devsim_telemetry::init_tracing;
use devsim_transmission::{
    ConnectionTester, ControllerConfig, ControllerStores, DeviceTransmissionController,
    HistoryConfig, ProjectTransmissionOrchestrator, TransmissionHistoryService,
};
use devsim_transport::{RoutingTransport, Transport};
use domain::SessionContext;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 存储集合：Postgres 或内存实现。
#[derive(Clone)]
pub struct Stores {
    pub device_store: Arc<dyn DeviceStore>,
    pub connection_store: Arc<dyn ConnectionStore>,
    pub connection_test_store: Arc<dyn ConnectionTestStore>,
    pub project_store: Arc<dyn ProjectStore>,
    pub history_store: Arc<dyn TransmissionHistoryStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            device_store: Arc::new(InMemoryDeviceStore::new()),
            connection_store: Arc::new(InMemoryConnectionStore::new()),
            connection_test_store: Arc::new(InMemoryConnectionTestStore::new()),
            project_store: Arc::new(InMemoryProjectStore::new()),
            history_store: Arc::new(InMemoryHistoryStore::new()),
        }
    }

    pub async fn postgres(database_url: &str) -> Result<Self, devsim_storage::StorageError> {
        let pool = connect_pool(database_url).await?;
        ensure_schema(&pool).await?;
        Ok(Self {
            device_store: Arc::new(PgDeviceStore::new(pool.clone())),
            connection_store: Arc::new(PgConnectionStore::new(pool.clone())),
            connection_test_store: Arc::new(PgConnectionTestStore::new(pool.clone())),
            project_store: Arc::new(PgProjectStore::new(pool.clone())),
            history_store: Arc::new(PgHistoryStore::new(pool)),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub device_store: Arc<dyn DeviceStore>,
    pub connection_store: Arc<dyn ConnectionStore>,
    pub controller: DeviceTransmissionController,
    pub orchestrator: ProjectTransmissionOrchestrator,
    pub history: TransmissionHistoryService,
    pub ingest: CsvIngestionPipeline,
    pub tester: ConnectionTester,
    pub duplicate_max: u32,
    pub upload_max_bytes: usize,
}

impl AppState {
    pub fn new(stores: Stores, transport: Arc<dyn Transport>, config: &AppConfig) -> Self {
        let mqtt_timeout = Duration::from_millis(config.mqtt_timeout_ms);
        let controller = DeviceTransmissionController::new(
            ControllerStores {
                device_store: stores.device_store.clone(),
                connection_store: stores.connection_store.clone(),
                history_store: stores.history_store.clone(),
            },
            transport.clone(),
            ControllerConfig { mqtt_timeout },
        );
        let orchestrator = ProjectTransmissionOrchestrator::new(
            stores.project_store.clone(),
            stores.device_store.clone(),
            stores.history_store.clone(),
            controller.clone(),
        );
        let history = TransmissionHistoryService::new(
            stores.history_store.clone(),
            stores.device_store.clone(),
            stores.project_store.clone(),
            HistoryConfig {
                default_limit: config.history_default_limit,
                max_limit: config.history_max_limit,
            },
        );
        let ingest = CsvIngestionPipeline::new(
            stores.device_store.clone(),
            IngestConfig {
                preview_rows: config.preview_rows,
                max_bytes: config.upload_max_bytes,
            },
        );
        let tester = ConnectionTester::new(
            stores.connection_store.clone(),
            stores.connection_test_store.clone(),
            transport,
            mqtt_timeout,
        );
        Self {
            device_store: stores.device_store,
            connection_store: stores.connection_store,
            controller,
            orchestrator,
            history,
            ingest,
            tester,
            duplicate_max: config.duplicate_max,
            upload_max_bytes: config.upload_max_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    // 配置了数据库则使用 Postgres，否则使用内存存储
    let stores = match &config.database_url {
        Some(url) => Stores::postgres(url).await?,
        None => {
            info!(target: "devsim.api", "DEVSIM_DATABASE_URL not set, using in-memory stores");
            Stores::in_memory()
        }
    };
    let transport: Arc<dyn Transport> = Arc::new(RoutingTransport::with_defaults()?);
    let state = AppState::new(stores, transport, &config);

    if config.rearm_on_start {
        let armed = state.controller.rearm_active(&SessionContext::system()).await?;
        info!(target: "devsim.api", armed = armed, "active_devices_rearmed");
    }

    let scheduler_owner = state.controller.clone();
    let app = routes::build_app(state);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "devsim.api", addr = %config.http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    scheduler_owner.scheduler().shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        // 无法安装处理器时仅依赖 SIGTERM
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!(target: "devsim.api", signal = "SIGINT", "shutdown_requested");
        }
        () = terminate => {
            info!(target: "devsim.api", signal = "SIGTERM", "shutdown_requested");
        }
    }
}
