//! 验证辅助函数
//!
//! - ensure_session：验证会话上下文带有操作者
//! - ensure_id：验证资源 ID 非空

use crate::error::StorageError;
use domain::SessionContext;

/// 验证会话上下文
///
/// 所有数据访问都必须带有可追溯的操作者。
pub fn ensure_session(ctx: &SessionContext) -> Result<(), StorageError> {
    if ctx.actor.is_empty() {
        return Err(StorageError::new("session actor required"));
    }
    Ok(())
}

/// 验证资源 ID 非空
pub fn ensure_id(value: &str, field: &str) -> Result<(), StorageError> {
    if value.trim().is_empty() {
        return Err(StorageError::new(format!("{field} required")));
    }
    Ok(())
}
