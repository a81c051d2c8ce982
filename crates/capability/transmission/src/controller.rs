//! 单设备传输控制器。
//!
//! 状态迁移全部经过 `TransmissionState::apply`；每个操作与每次自动 tick
//! 都先取得设备锁，持久化状态后再武装或解除调度。

use crate::locks::DeviceLocks;
use crate::payload::build_payload;
use crate::scheduler::{TickHandler, TransmissionScheduler};
use crate::{MAX_FREQUENCY_SECONDS, TransmissionError, format_timestamp, now_epoch_ms};
use async_trait::async_trait;
use devsim_storage::{
    ConnectionRecord, ConnectionStore, DeviceRecord, DeviceStore, DeviceUpdate,
    TransmissionHistoryStore, TransmissionRecord,
};
use devsim_telemetry::{
    record_scheduler_tick_skipped, record_transmission_attempt, record_transmission_failure,
    record_transmission_latency_ms, record_transmission_success, record_transmission_timeout,
};
use devsim_transport::{Transport, TransportError, delivery_timeout, send_with_timeout};
use domain::{
    DeviceType, SessionContext, TransmissionCommand, TransmissionState, TransmissionStatus,
    TransmissionType,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 控制器依赖的存储集合。
#[derive(Clone)]
pub struct ControllerStores {
    pub device_store: Arc<dyn DeviceStore>,
    pub connection_store: Arc<dyn ConnectionStore>,
    pub history_store: Arc<dyn TransmissionHistoryStore>,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// MQTT 单次投递超时。
    pub mqtt_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mqtt_timeout: Duration::from_millis(10_000),
        }
    }
}

/// 传输配置更新；字段为 `None` 表示保持不变。
#[derive(Debug, Clone, Default)]
pub struct TransmissionConfigUpdate {
    pub device_type: Option<DeviceType>,
    pub transmission_frequency: Option<u32>,
    pub enabled: Option<bool>,
    /// 外层 `None` 不修改，`Some(None)` 清空选中连接。
    pub connection_id: Option<Option<String>>,
}

/// 手动传输结果；投递失败不作为错误返回。
#[derive(Debug, Clone)]
pub struct TransmitOutcome {
    pub success: bool,
    pub current_row_index: Option<u32>,
    pub last_transmission_ms: i64,
    pub error: Option<String>,
    pub record: TransmissionRecord,
}

/// 设备传输状态视图。
#[derive(Debug, Clone, Serialize)]
pub struct DeviceTransmissionState {
    pub device_id: String,
    pub state: TransmissionState,
    pub transmission_enabled: bool,
    pub transmission_paused: bool,
    pub selected_connection_id: Option<String>,
    pub scheduled_connection_id: Option<String>,
    pub transmission_frequency: u32,
    pub current_row_index: u32,
    pub row_count: usize,
    pub allowed_actions: Vec<&'static str>,
}

struct ControllerInner {
    stores: ControllerStores,
    transport: Arc<dyn Transport>,
    locks: DeviceLocks,
    scheduler: TransmissionScheduler,
    config: ControllerConfig,
}

/// 设备传输控制器。
#[derive(Clone)]
pub struct DeviceTransmissionController {
    inner: Arc<ControllerInner>,
}

impl DeviceTransmissionController {
    pub fn new(
        stores: ControllerStores,
        transport: Arc<dyn Transport>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                stores,
                transport,
                locks: DeviceLocks::new(),
                scheduler: TransmissionScheduler::new(),
                config,
            }),
        }
    }

    pub fn scheduler(&self) -> &TransmissionScheduler {
        &self.inner.scheduler
    }

    /// 更新传输配置。
    ///
    /// `enabled` 由 false 变为 true 且提供了连接时，等价于一次原子的 `start`。
    pub async fn configure(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        update: TransmissionConfigUpdate,
    ) -> Result<DeviceRecord, TransmissionError> {
        let _guard = self.inner.locks.acquire(device_id).await;
        let device = self.inner.load_device(ctx, device_id).await?;

        if let Some(frequency) = update.transmission_frequency {
            validate_frequency(frequency)?;
        }
        let device_type = update.device_type.unwrap_or(device.device_type);
        let frequency = update
            .transmission_frequency
            .unwrap_or(device.transmission_frequency);
        let connection_id = match &update.connection_id {
            Some(Some(connection_id)) => {
                self.inner.load_connection(ctx, connection_id).await?;
                Some(connection_id.clone())
            }
            Some(None) => None,
            None => device.selected_connection_id.clone(),
        };
        let enabled = update
            .enabled
            .unwrap_or(device.transmission_state.is_enabled());
        if enabled && device_type == DeviceType::Sensor && !device.has_dataset() {
            return Err(TransmissionError::Validation(
                "a Sensor device needs committed CSV data before transmission can be enabled"
                    .to_string(),
            ));
        }

        let current = device.transmission_state;
        let next = if !enabled {
            current.apply(TransmissionCommand::Stop)?
        } else if !current.is_enabled() {
            match update.connection_id.as_ref().and_then(|value| value.as_ref()) {
                Some(connection_id) => {
                    self.ensure_startable(ctx, &device, connection_id).await?;
                    current.apply(TransmissionCommand::Start)?
                }
                None => current.apply(TransmissionCommand::Enable)?,
            }
        } else {
            if current == TransmissionState::Active
                && let Some(Some(connection_id)) = &update.connection_id
                && device.selected_connection_id.as_deref() != Some(connection_id.as_str())
            {
                return Err(already_transmitting(&device));
            }
            current
        };
        if next == TransmissionState::Active {
            match connection_id.as_deref() {
                Some(connection_id) => {
                    if device.selected_connection_id.as_deref() != Some(connection_id) {
                        self.inner.load_active_connection(ctx, connection_id).await?;
                    }
                }
                None => {
                    return Err(TransmissionError::Conflict(
                        "stop the transmission before clearing its connection".to_string(),
                    ));
                }
            }
        }

        let updated = self
            .inner
            .stores
            .device_store
            .update_device(
                ctx,
                device_id,
                DeviceUpdate {
                    device_type: Some(device_type),
                    transmission_frequency: Some(frequency),
                    transmission_state: Some(next),
                    selected_connection_id: update.connection_id.clone(),
                    ..DeviceUpdate::default()
                },
            )
            .await?
            .ok_or_else(|| device_not_found(device_id))?;
        self.sync_schedule(&updated);
        info!(
            target: "devsim.transmission",
            device_id = %device_id,
            actor = %ctx.actor,
            from = %current.as_str(),
            to = %next.as_str(),
            frequency = frequency,
            "transmission_configured"
        );
        Ok(updated)
    }

    /// 以指定连接开始自动传输。
    pub async fn start(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        connection_id: &str,
    ) -> Result<DeviceRecord, TransmissionError> {
        let _guard = self.inner.locks.acquire(device_id).await;
        let device = self.inner.load_device(ctx, device_id).await?;
        let active = device.transmission_state == TransmissionState::Active;
        if active && device.selected_connection_id.as_deref() != Some(connection_id) {
            return Err(already_transmitting(&device));
        }
        self.ensure_startable(ctx, &device, connection_id).await?;
        if active {
            self.sync_schedule(&device);
            return Ok(device);
        }
        let next = device.transmission_state.apply(TransmissionCommand::Start)?;
        let updated = self
            .transition(ctx, &device, next, Some(Some(connection_id.to_string())))
            .await?;
        Ok(updated)
    }

    /// 暂停自动传输；已暂停时幂等。
    pub async fn pause(
        &self,
        ctx: &SessionContext,
        device_id: &str,
    ) -> Result<DeviceRecord, TransmissionError> {
        let _guard = self.inner.locks.acquire(device_id).await;
        let device = self.inner.load_device(ctx, device_id).await?;
        let next = device.transmission_state.apply(TransmissionCommand::Pause)?;
        if next == device.transmission_state {
            return Ok(device);
        }
        self.transition(ctx, &device, next, None).await
    }

    /// 从暂停恢复；`connection_id` 为空时使用设备已选连接。
    pub async fn resume(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        connection_id: Option<&str>,
    ) -> Result<DeviceRecord, TransmissionError> {
        let _guard = self.inner.locks.acquire(device_id).await;
        let device = self.inner.load_device(ctx, device_id).await?;
        let next = device.transmission_state.apply(TransmissionCommand::Resume)?;
        let connection_id = connection_id
            .map(str::to_string)
            .or_else(|| device.selected_connection_id.clone())
            .ok_or_else(|| {
                TransmissionError::Validation("device has no selected connection".to_string())
            })?;
        self.ensure_startable(ctx, &device, &connection_id).await?;
        self.transition(ctx, &device, next, Some(Some(connection_id)))
            .await
    }

    /// 停止传输；任意状态均可，幂等。游标保持不变。
    pub async fn stop(
        &self,
        ctx: &SessionContext,
        device_id: &str,
    ) -> Result<DeviceRecord, TransmissionError> {
        let _guard = self.inner.locks.acquire(device_id).await;
        let device = self.inner.load_device(ctx, device_id).await?;
        let next = device.transmission_state.apply(TransmissionCommand::Stop)?;
        if next == device.transmission_state {
            self.inner.scheduler.disarm(device_id);
            return Ok(device);
        }
        self.transition(ctx, &device, next, None).await
    }

    /// 立即发送一次（MANUAL）。自动传输进行中时拒绝且不写记录。
    pub async fn transmit_now(
        &self,
        ctx: &SessionContext,
        device_id: &str,
        connection_id: &str,
    ) -> Result<TransmitOutcome, TransmissionError> {
        let _guard = self.inner.locks.acquire(device_id).await;
        let device = self.inner.load_device(ctx, device_id).await?;
        device
            .transmission_state
            .apply(TransmissionCommand::TransmitNow)?;
        if !device.has_dataset() {
            return Err(TransmissionError::Validation(
                "device has no CSV data to transmit".to_string(),
            ));
        }
        let connection = self.inner.load_active_connection(ctx, connection_id).await?;
        let (record, current_row_index) = self
            .inner
            .deliver(ctx, &device, &connection, TransmissionType::Manual)
            .await?;
        Ok(TransmitOutcome {
            success: record.status == TransmissionStatus::Success,
            current_row_index,
            last_transmission_ms: record.timestamp_ms,
            error: record.error_message.clone(),
            record,
        })
    }

    /// Sensor 游标归零，任意状态均可。
    pub async fn reset_sensor(
        &self,
        ctx: &SessionContext,
        device_id: &str,
    ) -> Result<DeviceRecord, TransmissionError> {
        let _guard = self.inner.locks.acquire(device_id).await;
        let device = self.inner.load_device(ctx, device_id).await?;
        if device.device_type != DeviceType::Sensor {
            return Err(TransmissionError::Validation(
                "only Sensor devices have a row cursor".to_string(),
            ));
        }
        let updated = self
            .inner
            .stores
            .device_store
            .update_device(
                ctx,
                device_id,
                DeviceUpdate {
                    current_row_index: Some(0),
                    ..DeviceUpdate::default()
                },
            )
            .await?
            .ok_or_else(|| device_not_found(device_id))?;
        info!(target: "devsim.transmission", device_id = %device_id, actor = %ctx.actor, "sensor_reset");
        Ok(updated)
    }

    /// 当前状态、允许的操作与调度连接。
    pub async fn state(
        &self,
        ctx: &SessionContext,
        device_id: &str,
    ) -> Result<DeviceTransmissionState, TransmissionError> {
        let device = self.inner.load_device(ctx, device_id).await?;
        let state = device.transmission_state;
        Ok(DeviceTransmissionState {
            device_id: device.device_id.clone(),
            state,
            transmission_enabled: state.is_enabled(),
            transmission_paused: state.is_paused(),
            selected_connection_id: device.selected_connection_id.clone(),
            scheduled_connection_id: self.inner.scheduler.scheduled_connection(device_id),
            transmission_frequency: device.transmission_frequency,
            current_row_index: device.current_row_index,
            row_count: device.row_count(),
            allowed_actions: state
                .allowed_commands()
                .into_iter()
                .map(|command| command.as_str())
                .collect(),
        })
    }

    /// 进程启动时为持久化为 `ACTIVE` 的设备重新武装调度。
    pub async fn rearm_active(&self, ctx: &SessionContext) -> Result<usize, TransmissionError> {
        let devices = self.inner.stores.device_store.list_devices(ctx).await?;
        let mut armed = 0;
        for device in devices {
            if device.transmission_state == TransmissionState::Active
                && device.selected_connection_id.is_some()
            {
                self.sync_schedule(&device);
                armed += 1;
            }
        }
        info!(target: "devsim.transmission", armed = armed, "scheduler_rearmed");
        Ok(armed)
    }

    /// 设备删除前调用：停止调度并释放锁条目。
    pub async fn forget(&self, device_id: &str) {
        {
            let _guard = self.inner.locks.acquire(device_id).await;
            self.inner.scheduler.disarm(device_id);
        }
        self.inner.locks.forget(device_id);
    }

    /// 校验连接存在且启用；供批量编排预检。
    pub async fn active_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
    ) -> Result<ConnectionRecord, TransmissionError> {
        self.inner.load_active_connection(ctx, connection_id).await
    }

    async fn ensure_startable(
        &self,
        ctx: &SessionContext,
        device: &DeviceRecord,
        connection_id: &str,
    ) -> Result<(), TransmissionError> {
        if !device.has_dataset() {
            return Err(TransmissionError::Validation(
                "device has no CSV data to transmit".to_string(),
            ));
        }
        self.inner.load_active_connection(ctx, connection_id).await?;
        Ok(())
    }

    async fn transition(
        &self,
        ctx: &SessionContext,
        device: &DeviceRecord,
        next: TransmissionState,
        selected_connection_id: Option<Option<String>>,
    ) -> Result<DeviceRecord, TransmissionError> {
        let updated = self
            .inner
            .stores
            .device_store
            .update_device(
                ctx,
                &device.device_id,
                DeviceUpdate {
                    transmission_state: Some(next),
                    selected_connection_id,
                    ..DeviceUpdate::default()
                },
            )
            .await?
            .ok_or_else(|| device_not_found(&device.device_id))?;
        self.sync_schedule(&updated);
        info!(
            target: "devsim.transmission",
            device_id = %updated.device_id,
            actor = %ctx.actor,
            from = %device.transmission_state.as_str(),
            to = %next.as_str(),
            connection_id = ?updated.selected_connection_id,
            "transmission_state_changed"
        );
        Ok(updated)
    }

    /// 按持久化状态武装或解除调度。
    fn sync_schedule(&self, device: &DeviceRecord) {
        match (&device.transmission_state, &device.selected_connection_id) {
            (TransmissionState::Active, Some(connection_id)) => {
                let handler: Arc<dyn TickHandler> = self.inner.clone();
                self.inner.scheduler.arm(
                    &device.device_id,
                    connection_id,
                    Duration::from_secs(u64::from(device.transmission_frequency.max(1))),
                    handler,
                );
            }
            _ => {
                self.inner.scheduler.disarm(&device.device_id);
            }
        }
    }
}

impl ControllerInner {
    async fn load_device(
        &self,
        ctx: &SessionContext,
        device_id: &str,
    ) -> Result<DeviceRecord, TransmissionError> {
        self.stores
            .device_store
            .find_device(ctx, device_id)
            .await?
            .ok_or_else(|| device_not_found(device_id))
    }

    async fn load_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
    ) -> Result<ConnectionRecord, TransmissionError> {
        self.stores
            .connection_store
            .find_connection(ctx, connection_id)
            .await?
            .ok_or_else(|| {
                TransmissionError::NotFound(format!("connection not found: {connection_id}"))
            })
    }

    async fn load_active_connection(
        &self,
        ctx: &SessionContext,
        connection_id: &str,
    ) -> Result<ConnectionRecord, TransmissionError> {
        let connection = self.load_connection(ctx, connection_id).await?;
        if !connection.is_active {
            return Err(TransmissionError::Validation(format!(
                "connection {} is not active",
                connection.name
            )));
        }
        Ok(connection)
    }

    /// 发送原语：调用方必须持有设备锁。
    ///
    /// 无论投递成败都写入一条历史记录，随后 Sensor 游标前进一行。
    async fn deliver(
        &self,
        ctx: &SessionContext,
        device: &DeviceRecord,
        connection: &ConnectionRecord,
        transmission_type: TransmissionType,
    ) -> Result<(TransmissionRecord, Option<u32>), TransmissionError> {
        let now_ms = now_epoch_ms();
        let timestamp = format_timestamp(now_ms);
        let payload = build_payload(device, &timestamp).ok_or_else(|| {
            TransmissionError::Validation("device has no CSV data to transmit".to_string())
        })?;
        let automatic = transmission_type == TransmissionType::Automatic;
        record_transmission_attempt(automatic);

        let timeout = delivery_timeout(connection, self.config.mqtt_timeout);
        let started_at = Instant::now();
        let result = send_with_timeout(self.transport.as_ref(), connection, &payload, timeout).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        record_transmission_latency_ms(elapsed_ms);
        let error_message = match &result {
            Ok(_) => {
                record_transmission_success();
                None
            }
            Err(err) => {
                if matches!(err, TransportError::Timeout(_)) {
                    record_transmission_timeout();
                }
                record_transmission_failure();
                Some(err.to_string())
            }
        };

        let row_index = match device.device_type {
            DeviceType::Sensor => Some(device.current_row_index),
            DeviceType::WebApp => None,
        };
        let record = TransmissionRecord {
            transmission_id: uuid::Uuid::new_v4().to_string(),
            device_id: device.device_id.clone(),
            device_name: device.name.clone(),
            device_reference: device.reference.clone(),
            project_id: device.project_id.clone(),
            connection_id: connection.connection_id.clone(),
            connection_name: connection.name.clone(),
            status: if error_message.is_none() {
                TransmissionStatus::Success
            } else {
                TransmissionStatus::Failed
            },
            transmission_type,
            row_index,
            timestamp_ms: now_ms,
            response_time_ms: Some(elapsed_ms),
            error_message,
        };
        // 先写历史，失败时设备游标与发送时间保持不变
        let record = self.stores.history_store.record(ctx, record).await?;
        let is_sensor = device.device_type == DeviceType::Sensor;
        let updated = self
            .stores
            .device_store
            .mark_transmitted(ctx, &device.device_id, now_ms, is_sensor)
            .await?
            .ok_or_else(|| device_not_found(&device.device_id))?;
        let current_row_index = is_sensor.then_some(updated.current_row_index);
        info!(
            target: "devsim.transmission",
            device_id = %record.device_id,
            connection_id = %record.connection_id,
            transmission_type = %record.transmission_type.as_str(),
            status = %record.status.as_str(),
            row_index = ?record.row_index,
            response_time_ms = elapsed_ms,
            error = ?record.error_message,
            "transmission_recorded"
        );
        Ok((record, current_row_index))
    }
}

#[async_trait]
impl TickHandler for ControllerInner {
    async fn on_tick(&self, device_id: &str, connection_id: &str) -> bool {
        let ctx = SessionContext::system();
        let _guard = self.locks.acquire(device_id).await;
        let device = match self.stores.device_store.find_device(&ctx, device_id).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                record_scheduler_tick_skipped();
                return false;
            }
            Err(err) => {
                warn!(target: "devsim.scheduler", device_id = %device_id, error = %err, "tick_load_failed");
                record_scheduler_tick_skipped();
                return true;
            }
        };
        let still_scheduled = device.transmission_state == TransmissionState::Active
            && device.selected_connection_id.as_deref() == Some(connection_id);
        if !still_scheduled {
            record_scheduler_tick_skipped();
            return false;
        }
        let connection = match self.load_active_connection(&ctx, connection_id).await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(target: "devsim.scheduler", device_id = %device_id, error = %err, "tick_skipped");
                record_scheduler_tick_skipped();
                return true;
            }
        };
        if let Err(err) = self
            .deliver(&ctx, &device, &connection, TransmissionType::Automatic)
            .await
        {
            warn!(target: "devsim.scheduler", device_id = %device_id, error = %err, "tick_failed");
        }
        true
    }
}

fn validate_frequency(frequency: u32) -> Result<(), TransmissionError> {
    if frequency == 0 || frequency > MAX_FREQUENCY_SECONDS {
        return Err(TransmissionError::Validation(format!(
            "transmission_frequency must be between 1 and {MAX_FREQUENCY_SECONDS} seconds"
        )));
    }
    Ok(())
}

/// 自动传输进行中不允许切换连接，需先 stop。
fn already_transmitting(device: &DeviceRecord) -> TransmissionError {
    TransmissionError::Conflict(format!(
        "device is already transmitting on connection {}",
        device.selected_connection_id.as_deref().unwrap_or("-")
    ))
}

fn device_not_found(device_id: &str) -> TransmissionError {
    TransmissionError::NotFound(format!("device not found: {device_id}"))
}
