//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：统一为 `{error, code}`，状态码与错误码一一对应
//!   （校验/格式 400，不存在 404，冲突 409，存储故障 500）
//! - CSV 附件响应
//! - Record → DTO 转换（时间戳格式化、连接认证掩码）

use api_contract::{
    ConnectionDto, ConnectionTestRecordDto, DeviceDto, ErrorBody, PreviewDto, ProjectDto,
    ProjectOperationDto, TransmissionRecordDto,
};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use devsim_ingest::{IngestError, PreviewStaging};
use devsim_storage::{
    ConnectionRecord, ConnectionTestRecord, DeviceRecord, ProjectOperationRecord, ProjectRecord,
    StorageError, TransmissionRecord,
};
use devsim_transmission::{TransmissionError, format_timestamp};
use tracing::error;

pub const CODE_VALIDATION: &str = "VALIDATION_ERROR";
pub const CODE_FORMAT: &str = "FORMAT_ERROR";
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";
pub const CODE_CONFLICT: &str = "CONFLICT";
pub const CODE_STORE_FAULT: &str = "STORE_FAULT";

/// 构造错误响应
pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(code, message))).into_response()
}

/// 校验错误响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, CODE_VALIDATION, message)
}

/// 资源未找到错误响应
pub fn not_found_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::NOT_FOUND, CODE_NOT_FOUND, message)
}

/// 冲突错误响应
pub fn conflict_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::CONFLICT, CODE_CONFLICT, message)
}

/// 存储错误响应
pub fn storage_error(err: StorageError) -> Response {
    error!(target: "devsim.api", error = %err, "store_fault");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        CODE_STORE_FAULT,
        err.to_string(),
    )
}

/// 传输链路错误映射
pub fn transmission_error(err: TransmissionError) -> Response {
    match err {
        TransmissionError::Validation(message) => bad_request_error(message),
        TransmissionError::NotFound(message) => not_found_error(message),
        TransmissionError::Conflict(message) => conflict_error(message),
        TransmissionError::Storage(err) => storage_error(err),
    }
}

/// CSV 接入错误映射
pub fn ingest_error(err: IngestError) -> Response {
    match err {
        IngestError::Format(message) => {
            error_response(StatusCode::BAD_REQUEST, CODE_FORMAT, message)
        }
        IngestError::NotFound(device_id) => {
            not_found_error(format!("device not found: {device_id}"))
        }
        IngestError::Storage(err) => storage_error(err),
    }
}

/// CSV 附件响应
pub fn csv_attachment(file_name: &str, body: String) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

fn optional_timestamp(ts_ms: Option<i64>) -> Option<String> {
    ts_ms.map(format_timestamp)
}

/// DeviceRecord 转 DeviceDto；`include_data` 为 false 时不输出数据集
pub fn device_to_dto(record: DeviceRecord, include_data: bool) -> DeviceDto {
    let state = record.transmission_state;
    let row_count = record.row_count();
    let has_csv_data = record.has_dataset();
    DeviceDto {
        id: record.device_id,
        reference: record.reference,
        name: record.name,
        description: record.description,
        device_type: record.device_type,
        transmission_frequency: record.transmission_frequency,
        transmission_enabled: state.is_enabled(),
        transmission_paused: state.is_paused(),
        transmission_state: state,
        selected_connection_id: record.selected_connection_id,
        current_row_index: record.current_row_index,
        row_count,
        has_csv_data,
        csv_data: if include_data { record.csv_data } else { None },
        project_id: record.project_id,
        last_transmission: optional_timestamp(record.last_transmission_ms),
        created_at: format_timestamp(record.created_at_ms),
    }
}

/// ConnectionRecord 转 ConnectionDto（认证字段掩码）
pub fn connection_to_dto(record: ConnectionRecord) -> ConnectionDto {
    ConnectionDto {
        connection_type: record.kind().as_str().to_string(),
        auth_type: record.auth.kind().as_str().to_string(),
        auth_config: record.auth.masked(),
        connection_config: record.settings.to_value(),
        id: record.connection_id,
        name: record.name,
        description: record.description,
        host: record.host,
        port: record.port,
        endpoint: record.endpoint,
        is_active: record.is_active,
        created_at: format_timestamp(record.created_at_ms),
    }
}

pub fn connection_test_to_dto(record: ConnectionTestRecord) -> ConnectionTestRecordDto {
    ConnectionTestRecordDto {
        id: record.test_id,
        connection_id: record.connection_id,
        success: record.success,
        response_time: record.response_time_ms,
        message: record.message,
        timestamp: format_timestamp(record.ts_ms),
    }
}

pub fn project_to_dto(record: ProjectRecord) -> ProjectDto {
    ProjectDto {
        id: record.project_id,
        name: record.name,
        description: record.description,
        transmission_status: record.transmission_status,
        created_at: format_timestamp(record.created_at_ms),
    }
}

pub fn transmission_record_to_dto(record: TransmissionRecord) -> TransmissionRecordDto {
    TransmissionRecordDto {
        id: record.transmission_id,
        device_id: record.device_id,
        device_name: record.device_name,
        device_reference: record.device_reference,
        project_id: record.project_id,
        connection_id: record.connection_id,
        connection_name: record.connection_name,
        status: record.status,
        transmission_type: record.transmission_type,
        row_index: record.row_index,
        timestamp: format_timestamp(record.timestamp_ms),
        response_time: record.response_time_ms,
        error_message: record.error_message,
    }
}

pub fn operation_to_dto(record: ProjectOperationRecord) -> ProjectOperationDto {
    ProjectOperationDto {
        id: record.operation_id,
        project_id: record.project_id,
        operation: record.operation,
        actor: record.actor,
        connection_id: record.connection_id,
        total_devices: record.total_devices,
        successful_operations: record.successful_operations,
        failed_operations: record.failed_operations,
        timestamp: format_timestamp(record.ts_ms),
    }
}

pub fn preview_to_dto(staging: PreviewStaging) -> PreviewDto {
    PreviewDto {
        file_name: staging.file_name,
        headers: staging.headers,
        csv_preview: staging.csv_preview,
        json_preview: staging.json_preview,
        total_rows: staging.total_rows,
        data: staging.data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::body_json;
    use domain::{AuthConfig, ConnectionSettings, MqttSettings};

    #[tokio::test]
    async fn transmission_errors_map_to_status_and_code() {
        let cases = [
            (
                TransmissionError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
                CODE_VALIDATION,
            ),
            (
                TransmissionError::NotFound("gone".to_string()),
                StatusCode::NOT_FOUND,
                CODE_NOT_FOUND,
            ),
            (
                TransmissionError::Conflict("busy".to_string()),
                StatusCode::CONFLICT,
                CODE_CONFLICT,
            ),
            (
                TransmissionError::Storage(StorageError::new("down")),
                StatusCode::INTERNAL_SERVER_ERROR,
                CODE_STORE_FAULT,
            ),
        ];
        for (err, status, code) in cases {
            let response = transmission_error(err);
            assert_eq!(response.status(), status);
            let body = body_json(response).await;
            assert_eq!(body["code"], code);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn format_error_is_bad_request() {
        let response = ingest_error(IngestError::Format("not csv".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], CODE_FORMAT);
        assert_eq!(body["error"], "not csv");
    }

    #[test]
    fn connection_dto_masks_secrets() {
        let record = ConnectionRecord {
            connection_id: "c1".to_string(),
            name: "broker".to_string(),
            description: None,
            host: "broker.local".to_string(),
            port: Some(1883),
            endpoint: "devices/data".to_string(),
            auth: AuthConfig::UserPass {
                username: "user".to_string(),
                password: "secret".to_string(),
            },
            settings: ConnectionSettings::Mqtt(MqttSettings::default()),
            is_active: true,
            created_at_ms: 0,
        };
        let dto = connection_to_dto(record);
        assert_eq!(dto.connection_type, "MQTT");
        assert_eq!(dto.auth_type, "USER_PASS");
        assert_eq!(dto.auth_config["password"], "***");
        assert_eq!(dto.auth_config["username"], "user");
        let text = serde_json::to_string(&dto).expect("serialize");
        assert!(!text.contains("secret"));
    }

    #[test]
    fn csv_attachment_headers() {
        let response = csv_attachment("history.csv", "a\n".to_string());
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"history.csv\""
        );
    }
}
