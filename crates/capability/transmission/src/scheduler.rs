use async_trait::async_trait;
use devsim_telemetry::record_scheduler_tick;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// tick 回调；返回 `false` 时该设备的调度任务退出。
#[async_trait]
pub trait TickHandler: Send + Sync {
    async fn on_tick(&self, device_id: &str, connection_id: &str) -> bool;
}

struct ScheduledSlot {
    connection_id: String,
    token: CancellationToken,
}

/// 自动传输调度器：每个武装设备一个固定间隔的任务。
#[derive(Default)]
pub struct TransmissionScheduler {
    slots: Mutex<HashMap<String, ScheduledSlot>>,
}

impl TransmissionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 武装设备；已有任务会先被取消。
    pub fn arm(
        &self,
        device_id: &str,
        connection_id: &str,
        frequency: Duration,
        handler: Arc<dyn TickHandler>,
    ) {
        let token = CancellationToken::new();
        let previous = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.insert(
                device_id.to_string(),
                ScheduledSlot {
                    connection_id: connection_id.to_string(),
                    token: token.clone(),
                },
            )
        };
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        info!(
            target: "devsim.scheduler",
            device_id = %device_id,
            connection_id = %connection_id,
            frequency_secs = frequency.as_secs(),
            "scheduler_armed"
        );

        let device_id = device_id.to_string();
        let connection_id = connection_id.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(frequency) => {}
                }
                if token.is_cancelled() {
                    break;
                }
                record_scheduler_tick();
                if !handler.on_tick(&device_id, &connection_id).await {
                    break;
                }
            }
            debug!(target: "devsim.scheduler", device_id = %device_id, "scheduler_task_exit");
        });
    }

    /// 解除武装；返回之前是否处于武装状态。
    pub fn disarm(&self, device_id: &str) -> bool {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.remove(device_id)
        };
        match slot {
            Some(slot) => {
                slot.token.cancel();
                info!(target: "devsim.scheduler", device_id = %device_id, "scheduler_disarmed");
                true
            }
            None => false,
        }
    }

    /// 当前调度使用的连接。
    pub fn scheduled_connection(&self, device_id: &str) -> Option<String> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(device_id).map(|slot| slot.connection_id.clone())
    }

    pub fn armed_count(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.len()
    }

    /// 进程退出时取消全部任务。
    pub fn shutdown(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, slot) in slots.drain() {
            slot.token.cancel();
        }
    }
}
