//! 连接 handlers
//!
//! - GET/POST /connections - 列表与创建
//! - GET/PUT/DELETE /connections/:connection_id - 详情、更新、删除
//! - POST /connections/:connection_id/test - 连通性测试
//! - GET /connections/:connection_id/history - 最近测试记录
//! - GET /connections/types, GET /connections/auth-types - 可选类型
//!
//! `auth_config` / `connection_config` 在边界处按判别值逐变体校验；
//! 响应中的敏感认证字段一律掩码。

use crate::AppState;
use crate::middleware::require_session;
use crate::utils::response::{
    bad_request_error, conflict_error, connection_test_to_dto, connection_to_dto,
    not_found_error, storage_error, transmission_error,
};
use crate::utils::{normalize_optional, normalize_required, validate_description};
use api_contract::{
    AuthTypesResponse, ConnectionDto, ConnectionTestDto, ConnectionTypesResponse,
    CreateConnectionRequest, LimitQuery, OptionDto, UpdateConnectionRequest,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use devsim_storage::{ConnectionRecord, ConnectionUpdate};
use domain::{
    AuthConfig, AuthKind, ConnectionKind, ConnectionSettings, TransmissionState,
    validate_endpoint,
};
use tracing::info;
use uuid::Uuid;

const DEFAULT_MQTT_TOPIC: &str = "devices/data";
const DEFAULT_HTTPS_PATH: &str = "/";
const DEFAULT_TEST_HISTORY_LIMIT: u64 = 10;
const MAX_TEST_HISTORY_LIMIT: u64 = 100;

pub async fn list_connections(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.connection_store.list_connections(&ctx).await {
        Ok(items) => {
            let data: Vec<ConnectionDto> = items.into_iter().map(connection_to_dto).collect();
            (StatusCode::OK, Json(data)).into_response()
        }
        Err(err) => storage_error(err),
    }
}

/// 创建连接
///
/// 端口可为空；MQTT 的 endpoint 为 topic（默认 `devices/data`），HTTPS 为路径（默认 `/`）。
pub async fn create_connection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateConnectionRequest>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let name = match normalize_required(req.name, "name") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let description = match validate_description(req.description) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let Some(kind) = ConnectionKind::parse(&req.connection_type) else {
        return bad_request_error(format!(
            "unsupported connection type: {}",
            req.connection_type
        ));
    };
    let host = req.host.trim().to_string();
    let port = match checked_port(&host, req.port) {
        Ok(port) => port,
        Err(response) => return response,
    };
    let auth_type = normalize_optional(req.auth_type).unwrap_or_else(|| "NONE".to_string());
    let auth = match AuthConfig::from_parts(&auth_type, req.auth_config.as_ref()) {
        Ok(auth) => auth,
        Err(err) => return bad_request_error(err.to_string()),
    };
    let settings = match ConnectionSettings::from_parts(kind, req.connection_config.as_ref()) {
        Ok(settings) => settings,
        Err(err) => return bad_request_error(err.to_string()),
    };
    let endpoint = normalize_optional(req.endpoint).unwrap_or_else(|| default_endpoint(kind));
    let record = ConnectionRecord {
        connection_id: Uuid::new_v4().to_string(),
        name,
        description,
        host,
        port,
        endpoint,
        auth,
        settings,
        is_active: req.is_active.unwrap_or(true),
        created_at_ms: chrono::Utc::now().timestamp_millis(),
    };
    match state.connection_store.create_connection(&ctx, record).await {
        Ok(record) => {
            info!(
                target: "devsim.api",
                connection_id = %record.connection_id,
                kind = %kind.as_str(),
                actor = %ctx.actor,
                "connection_created"
            );
            (StatusCode::CREATED, Json(connection_to_dto(record))).into_response()
        }
        Err(err) => storage_error(err),
    }
}

pub async fn get_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .connection_store
        .find_connection(&ctx, &connection_id)
        .await
    {
        Ok(Some(record)) => (StatusCode::OK, Json(connection_to_dto(record))).into_response(),
        Ok(None) => not_found_error(format!("connection not found: {connection_id}")),
        Err(err) => storage_error(err),
    }
}

/// 更新连接；类型不可修改
///
/// 只给 `auth_config` 时按现有认证类型解析；只给 `auth_type` 时以空配置解析。
pub async fn update_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateConnectionRequest>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let current = match state
        .connection_store
        .find_connection(&ctx, &connection_id)
        .await
    {
        Ok(Some(record)) => record,
        Ok(None) => return not_found_error(format!("connection not found: {connection_id}")),
        Err(err) => return storage_error(err),
    };

    let name = match req.name {
        Some(name) => match normalize_required(name, "name") {
            Ok(value) => Some(value),
            Err(response) => return response,
        },
        None => None,
    };
    let description = match req.description {
        Some(value) => match validate_description(value) {
            Ok(value) => Some(value),
            Err(response) => return response,
        },
        None => None,
    };
    let host = req.host.map(|host| host.trim().to_string());
    let effective_host = host.clone().unwrap_or_else(|| current.host.clone());
    let port = match req.port {
        Some(port) => match checked_port(&effective_host, port) {
            Ok(port) => Some(port),
            Err(response) => return response,
        },
        None => match checked_port(&effective_host, current.port.map(u32::from)) {
            Ok(_) => None,
            Err(response) => return response,
        },
    };
    let auth = if req.auth_type.is_some() || req.auth_config.is_some() {
        let auth_type = normalize_optional(req.auth_type)
            .unwrap_or_else(|| current.auth.kind().as_str().to_string());
        match AuthConfig::from_parts(&auth_type, req.auth_config.as_ref()) {
            Ok(auth) => Some(auth),
            Err(err) => return bad_request_error(err.to_string()),
        }
    } else {
        None
    };
    let settings = match req.connection_config {
        Some(config) => match ConnectionSettings::from_parts(current.kind(), Some(&config)) {
            Ok(settings) => Some(settings),
            Err(err) => return bad_request_error(err.to_string()),
        },
        None => None,
    };
    let update = ConnectionUpdate {
        name,
        description,
        host,
        port,
        endpoint: normalize_optional(req.endpoint),
        auth,
        settings,
        is_active: req.is_active,
    };
    match state
        .connection_store
        .update_connection(&ctx, &connection_id, update)
        .await
    {
        Ok(Some(record)) => {
            info!(target: "devsim.api", connection_id = %connection_id, actor = %ctx.actor, "connection_updated");
            (StatusCode::OK, Json(connection_to_dto(record))).into_response()
        }
        Ok(None) => not_found_error(format!("connection not found: {connection_id}")),
        Err(err) => storage_error(err),
    }
}

/// 删除连接：仍有设备在该连接上自动传输（ACTIVE / PAUSED）时拒绝
pub async fn delete_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let devices = match state.device_store.list_devices(&ctx).await {
        Ok(devices) => devices,
        Err(err) => return storage_error(err),
    };
    let in_use = devices
        .iter()
        .filter(|device| {
            matches!(
                device.transmission_state,
                TransmissionState::Active | TransmissionState::Paused
            ) && device.selected_connection_id.as_deref() == Some(connection_id.as_str())
        })
        .count();
    if in_use > 0 {
        return conflict_error(format!(
            "connection is in use by {in_use} transmitting device(s)"
        ));
    }
    match state
        .connection_store
        .delete_connection(&ctx, &connection_id)
        .await
    {
        Ok(true) => {
            info!(target: "devsim.api", connection_id = %connection_id, actor = %ctx.actor, "connection_deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => not_found_error(format!("connection not found: {connection_id}")),
        Err(err) => storage_error(err),
    }
}

/// 连通性测试：失败也返回 200 与 `{success: false}`，结果写入测试记录
pub async fn test_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.tester.test(&ctx, &connection_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(ConnectionTestDto {
                success: record.success,
                response_time: record.response_time_ms,
                message: record.message,
            }),
        )
            .into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn connection_test_history(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let limit = query.limit.unwrap_or(DEFAULT_TEST_HISTORY_LIMIT);
    if limit == 0 {
        return bad_request_error("limit must be at least 1");
    }
    match state
        .tester
        .history(&ctx, &connection_id, limit.min(MAX_TEST_HISTORY_LIMIT))
        .await
    {
        Ok(records) => {
            let data: Vec<_> = records.into_iter().map(connection_test_to_dto).collect();
            (StatusCode::OK, Json(data)).into_response()
        }
        Err(err) => transmission_error(err),
    }
}

pub async fn connection_types() -> Response {
    let types = vec![
        OptionDto {
            value: ConnectionKind::Mqtt.as_str(),
            label: "MQTT",
            description: "Publish payloads to an MQTT broker topic",
            default_port: Some(1883),
            fields: vec!["client_id", "keep_alive", "qos", "retain", "tls"],
        },
        OptionDto {
            value: ConnectionKind::Https.as_str(),
            label: "HTTPS",
            description: "Send payloads to an HTTP(S) endpoint",
            default_port: Some(443),
            fields: vec!["method", "timeout", "verify_tls", "headers"],
        },
    ];
    (StatusCode::OK, Json(ConnectionTypesResponse { types })).into_response()
}

pub async fn auth_types() -> Response {
    let auth_types = AuthKind::ALL
        .iter()
        .map(|kind| {
            let (label, description, fields) = match kind {
                AuthKind::None => ("None", "No authentication", vec![]),
                AuthKind::UserPass => (
                    "Username / Password",
                    "MQTT credentials or HTTP basic auth",
                    vec!["username", "password"],
                ),
                AuthKind::Token => (
                    "Token",
                    "Authorization header with a token",
                    vec!["token", "token_type"],
                ),
                AuthKind::ApiKey => (
                    "API Key",
                    "API key sent in a header or query parameter",
                    vec!["key", "location", "parameter_name"],
                ),
            };
            OptionDto {
                value: kind.as_str(),
                label,
                description,
                default_port: None,
                fields,
            }
        })
        .collect();
    (StatusCode::OK, Json(AuthTypesResponse { auth_types })).into_response()
}

fn default_endpoint(kind: ConnectionKind) -> String {
    match kind {
        ConnectionKind::Mqtt => DEFAULT_MQTT_TOPIC.to_string(),
        ConnectionKind::Https => DEFAULT_HTTPS_PATH.to_string(),
    }
}

/// 校验主机与端口，返回可存储的端口
fn checked_port(host: &str, port: Option<u32>) -> Result<Option<u16>, Response> {
    validate_endpoint(host, port).map_err(|err| bad_request_error(err.to_string()))?;
    Ok(port.and_then(|port| u16::try_from(port).ok()))
}
