//! CSV 上传 handlers
//!
//! - POST /devices/:device_id/upload - multipart 字段 `file`，只生成预览不落库
//! - POST /devices/:device_id/save - 提交确认后的数据集

use crate::AppState;
use crate::middleware::require_session;
use crate::utils::response::{
    CODE_FORMAT, device_to_dto, error_response, ingest_error, preview_to_dto,
};
use api_contract::{SaveCsvRequest, UploadResponse};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

const FILE_FIELD: &str = "file";

/// 上传 CSV 并返回预览
///
/// 解析失败（扩展名、编码、空表头、无数据行）返回 400 `FORMAT_ERROR`。
pub async fn upload_csv(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let (file_name, bytes) = loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return format_error("no file provided"),
            Err(err) => return format_error(format!("invalid multipart body: {err}")),
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => break (file_name, bytes),
            Err(err) => return format_error(format!("unable to read file: {err}")),
        }
    };
    if file_name.trim().is_empty() {
        return format_error("no file selected");
    }
    match state.ingest.stage(&ctx, &device_id, &file_name, &bytes).await {
        Ok(staging) => (
            StatusCode::OK,
            Json(UploadResponse {
                preview: preview_to_dto(staging),
            }),
        )
            .into_response(),
        Err(err) => ingest_error(err),
    }
}

/// 提交数据集：首次提交游标归零，再次提交越界时归零
pub async fn save_csv(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SaveCsvRequest>,
) -> Response {
    let ctx = match require_session(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.ingest.commit(&ctx, &device_id, req.csv_data).await {
        Ok(record) => (StatusCode::OK, Json(device_to_dto(record, false))).into_response(),
        Err(err) => ingest_error(err),
    }
}

fn format_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, CODE_FORMAT, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{actor_headers, body_json, seed_device, test_state};
    use axum::body::Body;
    use axum::extract::{FromRequest, Request};
    use axum::http::header;
    use devsim_storage::DeviceStore;
    use domain::{CsvDataset, DeviceType, SessionContext};

    const BOUNDARY: &str = "devsim-boundary";

    async fn multipart(file_name: &str, content: &str) -> Multipart {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n{content}\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/devices/d1/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request");
        Multipart::from_request(request, &()).await.expect("multipart")
    }

    #[tokio::test]
    async fn upload_returns_preview_without_committing() {
        let state = test_state();
        seed_device(&state, "d1", DeviceType::Sensor, 0).await;
        let content = "temp,unit\n21.5,C\n\"22,0\",C\n23.1,C\n";
        let response = upload_csv(
            State(state.clone()),
            Path("d1".to_string()),
            actor_headers(),
            multipart("readings.csv", content).await,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["preview"]["file_name"], "readings.csv");
        assert_eq!(body["preview"]["total_rows"], 3);
        assert_eq!(body["preview"]["headers"][0], "temp");
        assert_eq!(body["preview"]["data"][1]["temp"], "22,0");

        let device = state
            .device_store
            .find_device(&SessionContext::for_actor("tester"), "d1")
            .await
            .expect("find")
            .expect("device");
        assert!(device.csv_data.is_none());
    }

    #[tokio::test]
    async fn upload_rejects_non_csv() {
        let state = test_state();
        seed_device(&state, "d1", DeviceType::Sensor, 0).await;
        let response = upload_csv(
            State(state),
            Path("d1".to_string()),
            actor_headers(),
            multipart("readings.txt", "a\n1\n").await,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "FORMAT_ERROR");
    }

    #[tokio::test]
    async fn upload_for_missing_device_is_not_found() {
        let state = test_state();
        let response = upload_csv(
            State(state),
            Path("ghost".to_string()),
            actor_headers(),
            multipart("readings.csv", "a\n1\n").await,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn save_falls_back_to_json_preview() {
        let state = test_state();
        seed_device(&state, "d1", DeviceType::Sensor, 0).await;
        let csv_data: CsvDataset = serde_json::from_value(serde_json::json!({
            "headers": ["temp"],
            "csv_preview": [["1"], ["2"]],
            "json_preview": [{"temp": "1"}, {"temp": "2"}],
            "total_rows": 2
        }))
        .expect("dataset");
        let response = save_csv(
            State(state),
            Path("d1".to_string()),
            actor_headers(),
            Json(SaveCsvRequest { csv_data }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["has_csv_data"], true);
        assert_eq!(body["row_count"], 2);
        assert_eq!(body["current_row_index"], 0);
    }
}
