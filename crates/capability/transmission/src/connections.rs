use crate::{TransmissionError, now_epoch_ms};
use devsim_storage::{ConnectionStore, ConnectionTestRecord, ConnectionTestStore};
use devsim_telemetry::record_connection_test;
use devsim_transport::{Transport, delivery_timeout, test_with_timeout};
use domain::SessionContext;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// 连接连通性测试，每次测试写入一条测试记录。
#[derive(Clone)]
pub struct ConnectionTester {
    connection_store: Arc<dyn ConnectionStore>,
    test_store: Arc<dyn ConnectionTestStore>,
    transport: Arc<dyn Transport>,
    mqtt_timeout: Duration,
}

impl ConnectionTester {
    pub fn new(
        connection_store: Arc<dyn ConnectionStore>,
        test_store: Arc<dyn ConnectionTestStore>,
        transport: Arc<dyn Transport>,
        mqtt_timeout: Duration,
    ) -> Self {
        Self {
            connection_store,
            test_store,
            transport,
            mqtt_timeout,
        }
    }

    pub async fn test(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
    ) -> Result<ConnectionTestRecord, TransmissionError> {
        let connection = self
            .connection_store
            .find_connection(ctx, connection_id)
            .await?
            .ok_or_else(|| {
                TransmissionError::NotFound(format!("connection not found: {connection_id}"))
            })?;
        record_connection_test();
        let timeout = delivery_timeout(&connection, self.mqtt_timeout);
        let started_at = Instant::now();
        let result = test_with_timeout(self.transport.as_ref(), &connection, timeout).await;
        let response_time_ms = started_at.elapsed().as_millis() as u64;
        let (success, message) = match result {
            Ok(message) => (true, message),
            Err(err) => (false, err.to_string()),
        };
        let record = ConnectionTestRecord {
            test_id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection.connection_id.clone(),
            success,
            response_time_ms,
            message: Some(message),
            ts_ms: now_epoch_ms(),
        };
        let record = self.test_store.record_test(ctx, record).await?;
        info!(
            target: "devsim.transport",
            connection_id = %record.connection_id,
            success = record.success,
            response_time_ms = record.response_time_ms,
            "connection_tested"
        );
        Ok(record)
    }

    /// 最近的测试记录（新到旧）。
    pub async fn history(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
        limit: u64,
    ) -> Result<Vec<ConnectionTestRecord>, TransmissionError> {
        if self
            .connection_store
            .find_connection(ctx, connection_id)
            .await?
            .is_none()
        {
            return Err(TransmissionError::NotFound(format!(
                "connection not found: {connection_id}"
            )));
        }
        Ok(self.test_store.list_tests(ctx, connection_id, limit).await?)
    }
}
