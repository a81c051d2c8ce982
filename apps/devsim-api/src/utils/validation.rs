//! 输入验证辅助函数
//!
//! - normalize_required：必填字段去除空格并检查非空
//! - normalize_optional：可选字段，提供时去除空格，空串视为未提供
//! - validate_device_name / validate_description：设备名称与描述长度
//! - parse_history_filter：历史查询的状态与连接过滤
//!
//! 失败统一返回 bad_request_error 响应。

use crate::utils::response::bad_request_error;
use axum::response::Response;
use devsim_storage::HistoryFilter;
use domain::TransmissionStatus;

const DEVICE_NAME_MIN: usize = 2;
const DEVICE_NAME_MAX: usize = 100;
const DESCRIPTION_MAX: usize = 500;

/// 验证必填字段，去除空格并检查非空
pub fn normalize_required(value: String, field: &str) -> Result<String, Response> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(bad_request_error(format!("{field} required")));
    }
    Ok(trimmed.to_string())
}

/// 可选字段：去除空格，空串按未提供处理
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// 设备名称：去除空格后 2..=100 个字符
pub fn validate_device_name(value: String) -> Result<String, Response> {
    let name = normalize_required(value, "name")?;
    let len = name.chars().count();
    if !(DEVICE_NAME_MIN..=DEVICE_NAME_MAX).contains(&len) {
        return Err(bad_request_error(format!(
            "name must be between {DEVICE_NAME_MIN} and {DEVICE_NAME_MAX} characters"
        )));
    }
    Ok(name)
}

/// 描述：最多 500 个字符
pub fn validate_description(value: Option<String>) -> Result<Option<String>, Response> {
    let description = normalize_optional(value);
    if let Some(text) = &description
        && text.chars().count() > DESCRIPTION_MAX
    {
        return Err(bad_request_error(format!(
            "description must be at most {DESCRIPTION_MAX} characters"
        )));
    }
    Ok(description)
}

/// 历史过滤条件：`status` 须为 SUCCESS / FAILED
pub fn parse_history_filter(
    status: Option<String>,
    connection_id: Option<String>,
) -> Result<HistoryFilter, Response> {
    let status = match normalize_optional(status) {
        Some(value) => Some(
            TransmissionStatus::parse(&value)
                .ok_or_else(|| bad_request_error(format!("unsupported status: {value}")))?,
        ),
        None => None,
    };
    Ok(HistoryFilter {
        status,
        connection_id: normalize_optional(connection_id),
    })
}
