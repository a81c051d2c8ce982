//! 传输历史 handlers
//!
//! - GET /devices/:device_id/transmission-history - 分页查询（status / connection_id 过滤）
//! - GET /devices/:device_id/transmission-history/export - CSV 导出
//! - GET /projects/:project_id/transmission-history - 项目窗口（limit / offset）
//! - GET /projects/:project_id/transmission-history/export - 项目 CSV 导出

use crate::AppState;
use crate::middleware::require_session;
use crate::utils::parse_history_filter;
use crate::utils::response::{
    bad_request_error, csv_attachment, transmission_error, transmission_record_to_dto,
};
use api_contract::{HistoryPageDto, HistoryQuery, ProjectHistoryDto, WindowQuery};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

pub async fn device_history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let filter = match parse_history_filter(query.status, query.connection_id) {
        Ok(filter) => filter,
        Err(response) => return response,
    };
    match state
        .history
        .device_page(&ctx, &device_id, &filter, query.page, query.limit)
        .await
    {
        Ok(page) => {
            let dto = HistoryPageDto {
                history: page
                    .history
                    .into_iter()
                    .map(transmission_record_to_dto)
                    .collect(),
                total: page.total,
                total_pages: page.total_pages,
                page: page.page,
                limit: page.limit,
            };
            (StatusCode::OK, Json(dto)).into_response()
        }
        Err(err) => transmission_error(err),
    }
}

/// 设备历史导出：不分页，新到旧；无匹配记录时只有表头
pub async fn export_device_history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = ensure_csv_format(query.format.as_deref()) {
        return response;
    }
    let filter = match parse_history_filter(query.status, query.connection_id) {
        Ok(filter) => filter,
        Err(response) => return response,
    };
    match state
        .history
        .export_device_csv(&ctx, &device_id, &filter)
        .await
    {
        Ok(body) => csv_attachment(&format!("device_{device_id}_history.csv"), body),
        Err(err) => transmission_error(err),
    }
}

pub async fn project_history(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<WindowQuery>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .history
        .project_window(&ctx, &project_id, query.limit, query.offset)
        .await
    {
        Ok(records) => (
            StatusCode::OK,
            Json(ProjectHistoryDto {
                transmissions: records
                    .into_iter()
                    .map(transmission_record_to_dto)
                    .collect(),
            }),
        )
            .into_response(),
        Err(err) => transmission_error(err),
    }
}

pub async fn export_project_history(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if let Err(response) = ensure_csv_format(query.format.as_deref()) {
        return response;
    }
    let filter = match parse_history_filter(query.status, query.connection_id) {
        Ok(filter) => filter,
        Err(response) => return response,
    };
    match state
        .history
        .export_project_csv(&ctx, &project_id, &filter)
        .await
    {
        Ok(body) => csv_attachment(&format!("project_{project_id}_history.csv"), body),
        Err(err) => transmission_error(err),
    }
}

/// 导出只支持 csv；未指定时默认 csv
fn ensure_csv_format(format: Option<&str>) -> Result<(), Response> {
    match format.map(str::trim) {
        None | Some("") => Ok(()),
        Some(value) if value.eq_ignore_ascii_case("csv") => Ok(()),
        Some(value) => Err(bad_request_error(format!(
            "unsupported export format: {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::transmissions::transmit_now;
    use crate::test_support::{
        actor_headers, body_json, body_text, seed_connection, seed_device, test_state,
    };
    use api_contract::ConnectionSelection;
    use axum::http::header;
    use domain::DeviceType;

    async fn transmit(state: &AppState, device_id: &str, connection_id: &str) {
        let response = transmit_now(
            State(state.clone()),
            Path(device_id.to_string()),
            actor_headers(),
            Json(ConnectionSelection {
                connection_id: connection_id.to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn device_history_pages_newest_first() {
        let state = test_state();
        seed_device(&state, "d1", DeviceType::Sensor, 3).await;
        seed_connection(&state, "c1", true).await;
        for _ in 0..3 {
            transmit(&state, "d1", "c1").await;
        }

        let query = HistoryQuery {
            page: Some(1),
            limit: Some(2),
            ..HistoryQuery::default()
        };
        let response = device_history(
            State(state.clone()),
            Path("d1".to_string()),
            actor_headers(),
            Query(query),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["total_pages"], 2);
        assert_eq!(body["history"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["history"][0]["row_index"], 2);
        assert_eq!(body["history"][0]["transmission_type"], "MANUAL");
        assert_eq!(body["history"][0]["status"], "SUCCESS");
    }

    #[tokio::test]
    async fn device_history_rejects_unknown_status() {
        let state = test_state();
        seed_device(&state, "d1", DeviceType::Sensor, 1).await;
        let query = HistoryQuery {
            status: Some("PENDING".to_string()),
            ..HistoryQuery::default()
        };
        let response = device_history(
            State(state),
            Path("d1".to_string()),
            actor_headers(),
            Query(query),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn export_without_records_is_header_only() {
        let state = test_state();
        seed_device(&state, "d1", DeviceType::Sensor, 1).await;
        let response = export_device_history(
            State(state),
            Path("d1".to_string()),
            actor_headers(),
            Query(HistoryQuery {
                format: Some("csv".to_string()),
                ..HistoryQuery::default()
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"device_d1_history.csv\""
        );
        assert_eq!(
            body_text(response).await,
            "Connection,Status,Row,Timestamp,Error\n"
        );
    }

    #[tokio::test]
    async fn export_rejects_other_formats() {
        let state = test_state();
        seed_device(&state, "d1", DeviceType::Sensor, 1).await;
        let response = export_device_history(
            State(state),
            Path("d1".to_string()),
            actor_headers(),
            Query(HistoryQuery {
                format: Some("xlsx".to_string()),
                ..HistoryQuery::default()
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn project_history_for_missing_project_is_not_found() {
        let state = test_state();
        let response = project_history(
            State(state),
            Path("ghost".to_string()),
            actor_headers(),
            Query(WindowQuery::default()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
