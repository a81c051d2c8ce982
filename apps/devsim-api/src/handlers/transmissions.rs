//! 设备传输 handlers
//!
//! - GET/PUT /devices/:device_id/transmission-config - 传输配置
//! - GET /devices/:device_id/transmission-state - 状态机视图
//! - POST /devices/:device_id/{start|pause|resume|stop}-transmission - 生命周期
//! - POST /devices/:device_id/transmit - 手动发送一次
//! - POST /devices/:device_id/reset-sensor - Sensor 游标归零
//!
//! 状态迁移全部由 DeviceTransmissionController 完成，handler 只做解析与映射。

use crate::AppState;
use crate::middleware::require_session;
use crate::utils::normalize_required;
use crate::utils::response::{
    device_to_dto, not_found_error, storage_error, transmission_error,
};
use api_contract::{
    ConnectionOverride, ConnectionSelection, ResetSensorResponse, TransmissionConfigDto,
    TransmissionConfigRequest, TransmitResponse,
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use devsim_transmission::{TransmissionConfigUpdate, format_timestamp};
use tracing::info;

pub async fn get_transmission_config(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.device_store.find_device(&ctx, &device_id).await {
        Ok(Some(record)) => {
            let dto = TransmissionConfigDto {
                transmission_enabled: record.transmission_state.is_enabled(),
                transmission_paused: record.transmission_state.is_paused(),
                transmission_state: record.transmission_state,
                has_csv_data: record.has_dataset(),
                device_id: record.device_id,
                device_type: record.device_type,
                transmission_frequency: record.transmission_frequency,
                connection_id: record.selected_connection_id,
            };
            (StatusCode::OK, Json(dto)).into_response()
        }
        Ok(None) => not_found_error(format!("device not found: {device_id}")),
        Err(err) => storage_error(err),
    }
}

/// 更新传输配置
///
/// `transmission_enabled` 由 false 变为 true 且带连接时原子地启动自动传输。
pub async fn update_transmission_config(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TransmissionConfigRequest>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let update = TransmissionConfigUpdate {
        device_type: req.device_type,
        transmission_frequency: req.transmission_frequency,
        enabled: req.transmission_enabled,
        connection_id: req.connection_id.map(|value| {
            value
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
        }),
    };
    match state.controller.configure(&ctx, &device_id, update).await {
        Ok(record) => (StatusCode::OK, Json(device_to_dto(record, false))).into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn get_transmission_state(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.controller.state(&ctx, &device_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn start_transmission(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ConnectionSelection>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let connection_id = match normalize_required(req.connection_id, "connection_id") {
        Ok(value) => value,
        Err(response) => return response,
    };
    match state.controller.start(&ctx, &device_id, &connection_id).await {
        Ok(record) => {
            info!(
                target: "devsim.api",
                device_id = %device_id,
                connection_id = %connection_id,
                actor = %ctx.actor,
                "transmission_started"
            );
            (StatusCode::OK, Json(device_to_dto(record, false))).into_response()
        }
        Err(err) => transmission_error(err),
    }
}

pub async fn pause_transmission(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.controller.pause(&ctx, &device_id).await {
        Ok(record) => (StatusCode::OK, Json(device_to_dto(record, false))).into_response(),
        Err(err) => transmission_error(err),
    }
}

/// 恢复传输；请求体可选，`connection_id` 覆盖此前选中的连接
pub async fn resume_transmission(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<ConnectionOverride>>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let connection_id = override_connection(body);
    match state
        .controller
        .resume(&ctx, &device_id, connection_id.as_deref())
        .await
    {
        Ok(record) => (StatusCode::OK, Json(device_to_dto(record, false))).into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn stop_transmission(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.controller.stop(&ctx, &device_id).await {
        Ok(record) => (StatusCode::OK, Json(device_to_dto(record, false))).into_response(),
        Err(err) => transmission_error(err),
    }
}

/// 手动发送一次
///
/// 投递失败返回 200 与 `{success: false, error}`；游标照常前进。
pub async fn transmit_now(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ConnectionSelection>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let connection_id = match normalize_required(req.connection_id, "connection_id") {
        Ok(value) => value,
        Err(response) => return response,
    };
    match state
        .controller
        .transmit_now(&ctx, &device_id, &connection_id)
        .await
    {
        Ok(outcome) => {
            let body = TransmitResponse {
                success: outcome.success,
                current_row_index: outcome.current_row_index,
                last_transmission: Some(format_timestamp(outcome.last_transmission_ms)),
                error: outcome.error,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => transmission_error(err),
    }
}

pub async fn reset_sensor(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.controller.reset_sensor(&ctx, &device_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(ResetSensorResponse {
                current_row_index: record.current_row_index,
            }),
        )
            .into_response(),
        Err(err) => transmission_error(err),
    }
}

/// 可选请求体中的连接覆盖；空串视为未提供
pub(crate) fn override_connection(body: Option<Json<ConnectionOverride>>) -> Option<String> {
    body.and_then(|Json(req)| req.connection_id)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}
