use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 每设备单写者锁。
///
/// 手动操作与自动 tick 都先取得该锁，同一设备上的变更因此串行。
#[derive(Default)]
pub struct DeviceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, device_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(device_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// 设备删除后释放锁条目。
    pub fn forget(&self, device_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(device_id);
    }
}
