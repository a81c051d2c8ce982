//! 设备 handlers
//!
//! - GET /devices - 列出全部设备
//! - GET /devices/unassigned - 未加入项目的设备
//! - POST /devices - 创建设备（生成 8 位 reference）
//! - GET /devices/:device_id - 设备详情（含数据集）
//! - DELETE /devices/:device_id - 删除设备（先撤销调度）
//! - POST /devices/:device_id/duplicate - 复制设备

use crate::AppState;
use crate::middleware::require_session;
use crate::utils::response::{
    bad_request_error, device_to_dto, not_found_error, storage_error,
};
use crate::utils::{validate_description, validate_device_name};
use api_contract::{
    CreateDeviceRequest, DeviceDto, DuplicateDeviceRequest, DuplicateDevicesResponse,
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use devsim_storage::{DeviceRecord, DeviceStore, StorageError};
use devsim_transmission::MAX_FREQUENCY_SECONDS;
use domain::{SessionContext, TransmissionState};
use tracing::info;
use uuid::Uuid;

const REFERENCE_LEN: usize = 8;
const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const REFERENCE_ATTEMPTS: usize = 16;
const DEFAULT_FREQUENCY_SECONDS: u32 = 3600;

pub async fn list_devices(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.device_store.list_devices(&ctx).await {
        Ok(items) => {
            let data: Vec<DeviceDto> = items
                .into_iter()
                .map(|record| device_to_dto(record, false))
                .collect();
            (StatusCode::OK, Json(data)).into_response()
        }
        Err(err) => storage_error(err),
    }
}

pub async fn list_unassigned_devices(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.device_store.list_unassigned_devices(&ctx).await {
        Ok(items) => {
            let data: Vec<DeviceDto> = items
                .into_iter()
                .map(|record| device_to_dto(record, false))
                .collect();
            (StatusCode::OK, Json(data)).into_response()
        }
        Err(err) => storage_error(err),
    }
}

/// 创建设备
///
/// 名称 2..=100 字符，描述最多 500 字符，频率 1..=86400 秒。
/// 新设备处于 INACTIVE，未选择连接，未提交数据集。
pub async fn create_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateDeviceRequest>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let name = match validate_device_name(req.name) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let description = match validate_description(req.description) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let transmission_frequency = req
        .transmission_frequency
        .unwrap_or(DEFAULT_FREQUENCY_SECONDS);
    if !(1..=MAX_FREQUENCY_SECONDS).contains(&transmission_frequency) {
        return bad_request_error(format!(
            "transmission_frequency must be between 1 and {MAX_FREQUENCY_SECONDS} seconds"
        ));
    }
    let reference = match unique_reference(state.device_store.as_ref(), &ctx).await {
        Ok(value) => value,
        Err(err) => return storage_error(err),
    };
    let record = DeviceRecord {
        device_id: Uuid::new_v4().to_string(),
        reference,
        name,
        description,
        device_type: req.device_type.unwrap_or_default(),
        transmission_frequency,
        transmission_state: TransmissionState::Inactive,
        selected_connection_id: None,
        current_row_index: 0,
        csv_data: None,
        project_id: None,
        last_transmission_ms: None,
        created_at_ms: now_epoch_ms(),
    };
    match state.device_store.create_device(&ctx, record).await {
        Ok(record) => {
            info!(
                target: "devsim.api",
                device_id = %record.device_id,
                reference = %record.reference,
                actor = %ctx.actor,
                "device_created"
            );
            (StatusCode::CREATED, Json(device_to_dto(record, false))).into_response()
        }
        Err(err) => storage_error(err),
    }
}

pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.device_store.find_device(&ctx, &device_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(device_to_dto(record, true))).into_response(),
        Ok(None) => not_found_error(format!("device not found: {device_id}")),
        Err(err) => storage_error(err),
    }
}

/// 删除设备：先撤销调度与设备锁，再删除记录；历史记录保留
pub async fn delete_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.device_store.find_device(&ctx, &device_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_error(format!("device not found: {device_id}")),
        Err(err) => return storage_error(err),
    }
    state.controller.forget(&device_id).await;
    match state.device_store.delete_device(&ctx, &device_id).await {
        Ok(true) => {
            info!(target: "devsim.api", device_id = %device_id, actor = %ctx.actor, "device_deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => not_found_error(format!("device not found: {device_id}")),
        Err(err) => storage_error(err),
    }
}

/// 复制设备
///
/// 副本命名为 `"{name} {i}"`，复制类型、频率、描述、连接选择与数据集；
/// 副本处于 INACTIVE、游标为 0、不属于任何项目。
pub async fn duplicate_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<DuplicateDeviceRequest>>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let count = body.and_then(|Json(req)| req.count).unwrap_or(1);
    if count == 0 || count > state.duplicate_max {
        return bad_request_error(format!(
            "count must be between 1 and {}",
            state.duplicate_max
        ));
    }
    let source = match state.device_store.find_device(&ctx, &device_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found_error(format!("device not found: {device_id}")),
        Err(err) => return storage_error(err),
    };

    let mut duplicated = Vec::with_capacity(count as usize);
    for index in 1..=count {
        let reference = match unique_reference(state.device_store.as_ref(), &ctx).await {
            Ok(value) => value,
            Err(err) => return storage_error(err),
        };
        let record = DeviceRecord {
            device_id: Uuid::new_v4().to_string(),
            reference,
            name: format!("{} {index}", source.name),
            description: source.description.clone(),
            device_type: source.device_type,
            transmission_frequency: source.transmission_frequency,
            transmission_state: TransmissionState::Inactive,
            selected_connection_id: source.selected_connection_id.clone(),
            current_row_index: 0,
            csv_data: source.csv_data.clone(),
            project_id: None,
            last_transmission_ms: None,
            created_at_ms: now_epoch_ms(),
        };
        match state.device_store.create_device(&ctx, record).await {
            Ok(record) => duplicated.push(device_to_dto(record, false)),
            Err(err) => return storage_error(err),
        }
    }
    info!(
        target: "devsim.api",
        device_id = %device_id,
        count = duplicated.len(),
        actor = %ctx.actor,
        "device_duplicated"
    );
    (
        StatusCode::CREATED,
        Json(DuplicateDevicesResponse {
            duplicates_created: duplicated.len(),
            duplicated_devices: duplicated,
        }),
    )
        .into_response()
}

/// 从 UUID v4 随机字节生成 8 位 reference（A-Z0-9）
fn random_reference() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(REFERENCE_LEN)
        .map(|byte| REFERENCE_CHARSET[(*byte as usize) % REFERENCE_CHARSET.len()] as char)
        .collect()
}

async fn unique_reference(
    store: &dyn DeviceStore,
    ctx: &SessionContext,
) -> Result<String, StorageError> {
    for _ in 0..REFERENCE_ATTEMPTS {
        let candidate = random_reference();
        if store.find_by_reference(ctx, &candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    Err(StorageError::new("unable to allocate a unique device reference"))
}

fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{actor_headers, body_json, test_state};
    use serde_json::Value;

    fn create_request(name: &str) -> CreateDeviceRequest {
        CreateDeviceRequest {
            name: name.to_string(),
            description: Some("line 3".to_string()),
            device_type: None,
            transmission_frequency: None,
        }
    }

    async fn create(state: &AppState, name: &str) -> Value {
        let response = create_device(
            State(state.clone()),
            actor_headers(),
            Json(create_request(name)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[test]
    fn reference_is_eight_uppercase_alphanumerics() {
        let reference = random_reference();
        assert_eq!(reference.len(), 8);
        assert!(
            reference
                .chars()
                .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
        );
    }

    #[tokio::test]
    async fn create_device_applies_defaults() {
        let state = test_state();
        let body = create(&state, "  Pump A ").await;
        assert_eq!(body["name"], "Pump A");
        assert_eq!(body["device_type"], "WebApp");
        assert_eq!(body["transmission_frequency"], 3600);
        assert_eq!(body["transmission_enabled"], false);
        assert_eq!(body["transmission_state"], "INACTIVE");
        assert_eq!(body["has_csv_data"], false);
        assert_eq!(body["reference"].as_str().map(str::len), Some(8));
    }

    #[tokio::test]
    async fn create_device_rejects_bad_input() {
        let state = test_state();
        let response = create_device(
            State(state.clone()),
            actor_headers(),
            Json(create_request("x")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut req = create_request("valid name");
        req.transmission_frequency = Some(0);
        let response = create_device(State(state), actor_headers(), Json(req)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn duplicate_names_copies_in_order() {
        let state = test_state();
        let original = create(&state, "Meter").await;
        let id = original["id"].as_str().expect("id").to_string();

        let response = duplicate_device(
            State(state.clone()),
            Path(id.clone()),
            actor_headers(),
            Some(Json(DuplicateDeviceRequest { count: Some(3) })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["duplicates_created"], 3);
        let names: Vec<&str> = body["duplicated_devices"]
            .as_array()
            .expect("devices")
            .iter()
            .filter_map(|device| device["name"].as_str())
            .collect();
        assert_eq!(names, vec!["Meter 1", "Meter 2", "Meter 3"]);

        let response = list_devices(State(state), actor_headers()).await;
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(4));
    }

    #[tokio::test]
    async fn duplicate_count_is_bounded() {
        let state = test_state();
        let original = create(&state, "Meter").await;
        let id = original["id"].as_str().expect("id").to_string();
        for count in [0, 51] {
            let response = duplicate_device(
                State(state.clone()),
                Path(id.clone()),
                actor_headers(),
                Some(Json(DuplicateDeviceRequest { count: Some(count) })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let state = test_state();
        let original = create(&state, "Gauge").await;
        let id = original["id"].as_str().expect("id").to_string();

        let response = delete_device(State(state.clone()), Path(id.clone()), actor_headers()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = get_device(State(state.clone()), Path(id.clone()), actor_headers()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = delete_device(State(state), Path(id), actor_headers()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
