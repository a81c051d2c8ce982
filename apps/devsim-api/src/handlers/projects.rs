//! 项目 handlers
//!
//! - GET/POST /projects - 列表与创建
//! - GET/PUT/DELETE /projects/:project_id - 详情、更新、删除（删除先停止并释放成员）
//! - GET/POST /projects/:project_id/devices - 成员列表与批量加入
//! - DELETE /projects/:project_id/devices/:device_id - 移除成员
//! - POST /projects/:project_id/{start|pause|resume|stop}-transmission - 批量生命周期
//! - GET /projects/:project_id/{transmission-stats|validate|operations}

use crate::AppState;
use crate::handlers::transmissions::override_connection;
use crate::middleware::require_session;
use crate::utils::response::{
    bad_request_error, device_to_dto, operation_to_dto, project_to_dto, transmission_error,
};
use crate::utils::validate_description;
use api_contract::{
    AddDevicesRequest, ConnectionOverride, CreateProjectRequest, DeviceDto, LimitQuery,
    ProjectDetailDto, ProjectDto, UpdateProjectRequest,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::BulkOperation;

const DEFAULT_OPERATIONS_LIMIT: u64 = 20;
const MAX_OPERATIONS_LIMIT: u64 = 100;

pub async fn list_projects(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.orchestrator.list_projects(&ctx).await {
        Ok(items) => {
            let data: Vec<ProjectDto> = items.into_iter().map(project_to_dto).collect();
            (StatusCode::OK, Json(data)).into_response()
        }
        Err(err) => transmission_error(err),
    }
}

/// 创建项目：名称去空格后 1..=100 字符且唯一（重名 409）
pub async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateProjectRequest>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let description = match validate_description(req.description) {
        Ok(value) => value,
        Err(response) => return response,
    };
    match state
        .orchestrator
        .create_project(&ctx, &req.name, description)
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(project_to_dto(record))).into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.orchestrator.get_project(&ctx, &project_id).await {
        Ok((project, devices)) => {
            let devices: Vec<DeviceDto> = devices
                .into_iter()
                .map(|record| device_to_dto(record, false))
                .collect();
            let dto = ProjectDetailDto {
                project: project_to_dto(project),
                device_count: devices.len(),
                devices,
            };
            (StatusCode::OK, Json(dto)).into_response()
        }
        Err(err) => transmission_error(err),
    }
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateProjectRequest>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let description = match req.description {
        Some(value) => match validate_description(value) {
            Ok(value) => Some(value),
            Err(response) => return response,
        },
        None => None,
    };
    match state
        .orchestrator
        .update_project(&ctx, &project_id, req.name.as_deref(), description)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(project_to_dto(record))).into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.orchestrator.delete_project(&ctx, &project_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn list_project_devices(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.orchestrator.project_devices(&ctx, &project_id).await {
        Ok(devices) => {
            let data: Vec<DeviceDto> = devices
                .into_iter()
                .map(|record| device_to_dto(record, false))
                .collect();
            (StatusCode::OK, Json(data)).into_response()
        }
        Err(err) => transmission_error(err),
    }
}

/// 批量加入设备，逐个返回 ADDED / ALREADY_MEMBER / CONFLICT / NOT_FOUND
pub async fn add_project_devices(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AddDevicesRequest>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if req.device_ids.is_empty() {
        return bad_request_error("device_ids must not be empty");
    }
    match state
        .orchestrator
        .add_devices(&ctx, &project_id, &req.device_ids)
        .await
    {
        Ok(results) => (StatusCode::OK, Json(results)).into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn remove_project_device(
    State(state): State<AppState>,
    Path((project_id, device_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .orchestrator
        .remove_device(&ctx, &project_id, &device_id)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(device_to_dto(record, false))).into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn start_project_transmission(
    state: State<AppState>,
    project_id: Path<String>,
    headers: HeaderMap,
    body: Option<Json<ConnectionOverride>>,
) -> Response {
    run_bulk(state, project_id, headers, BulkOperation::Start, body).await
}

pub async fn pause_project_transmission(
    state: State<AppState>,
    project_id: Path<String>,
    headers: HeaderMap,
) -> Response {
    run_bulk(state, project_id, headers, BulkOperation::Pause, None).await
}

pub async fn resume_project_transmission(
    state: State<AppState>,
    project_id: Path<String>,
    headers: HeaderMap,
    body: Option<Json<ConnectionOverride>>,
) -> Response {
    run_bulk(state, project_id, headers, BulkOperation::Resume, body).await
}

pub async fn stop_project_transmission(
    state: State<AppState>,
    project_id: Path<String>,
    headers: HeaderMap,
) -> Response {
    run_bulk(state, project_id, headers, BulkOperation::Stop, None).await
}

/// 批量操作：单个设备失败不影响其他设备；覆盖连接无效时整体失败
async fn run_bulk(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    operation: BulkOperation,
    body: Option<Json<ConnectionOverride>>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let connection_id = override_connection(body);
    match state
        .orchestrator
        .run_bulk(&ctx, &project_id, operation, connection_id.as_deref())
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn project_stats(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.orchestrator.stats(&ctx, &project_id).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn validate_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.orchestrator.validate(&ctx, &project_id).await {
        Ok(validation) => (StatusCode::OK, Json(validation)).into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn project_operations(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let limit = query.limit.unwrap_or(DEFAULT_OPERATIONS_LIMIT);
    if limit == 0 {
        return bad_request_error("limit must be at least 1");
    }
    match state
        .orchestrator
        .operations(&ctx, &project_id, limit.min(MAX_OPERATIONS_LIMIT))
        .await
    {
        Ok(records) => {
            let data: Vec<_> = records.into_iter().map(operation_to_dto).collect();
            (StatusCode::OK, Json(data)).into_response()
        }
        Err(err) => transmission_error(err),
    }
}
