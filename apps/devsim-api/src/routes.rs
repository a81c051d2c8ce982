//! 路由定义
//!
//! 集中管理所有 API 路由，将路径映射到对应的 handlers。
//! 路由包括：
//! - 健康检查与指标：/health, /metrics
//! - 设备：/devices/*（传输配置、生命周期、上传、历史）
//! - 连接：/connections/*
//! - 项目：/projects/*（成员、批量传输、统计）
//!
//! 所有路由同时挂载在 / 与 /api 下。

use super::AppState;
use super::handlers::*;
use super::middleware::request_context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// multipart 头部与边界的额外开销
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// 创建 API 路由
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_snapshot))
        // 设备
        .route("/devices", get(list_devices).post(create_device))
        .route("/devices/unassigned", get(list_unassigned_devices))
        .route("/devices/:device_id", get(get_device).delete(delete_device))
        .route("/devices/:device_id/duplicate", post(duplicate_device))
        .route(
            "/devices/:device_id/transmission-config",
            get(get_transmission_config).put(update_transmission_config),
        )
        .route(
            "/devices/:device_id/transmission-state",
            get(get_transmission_state),
        )
        .route(
            "/devices/:device_id/start-transmission",
            post(start_transmission),
        )
        .route(
            "/devices/:device_id/pause-transmission",
            post(pause_transmission),
        )
        .route(
            "/devices/:device_id/resume-transmission",
            post(resume_transmission),
        )
        .route(
            "/devices/:device_id/stop-transmission",
            post(stop_transmission),
        )
        .route("/devices/:device_id/transmit", post(transmit_now))
        .route("/devices/:device_id/reset-sensor", post(reset_sensor))
        .route("/devices/:device_id/upload", post(upload_csv))
        .route("/devices/:device_id/save", post(save_csv))
        .route(
            "/devices/:device_id/transmission-history",
            get(device_history),
        )
        .route(
            "/devices/:device_id/transmission-history/export",
            get(export_device_history),
        )
        // 连接
        .route(
            "/connections",
            get(list_connections).post(create_connection),
        )
        .route("/connections/types", get(connection_types))
        .route("/connections/auth-types", get(auth_types))
        .route(
            "/connections/:connection_id",
            get(get_connection)
                .put(update_connection)
                .delete(delete_connection),
        )
        .route("/connections/:connection_id/test", post(test_connection))
        .route(
            "/connections/:connection_id/history",
            get(connection_test_history),
        )
        // 项目
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/:project_id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route(
            "/projects/:project_id/devices",
            get(list_project_devices).post(add_project_devices),
        )
        .route(
            "/projects/:project_id/devices/:device_id",
            delete(remove_project_device),
        )
        .route(
            "/projects/:project_id/start-transmission",
            post(start_project_transmission),
        )
        .route(
            "/projects/:project_id/pause-transmission",
            post(pause_project_transmission),
        )
        .route(
            "/projects/:project_id/resume-transmission",
            post(resume_project_transmission),
        )
        .route(
            "/projects/:project_id/stop-transmission",
            post(stop_project_transmission),
        )
        .route(
            "/projects/:project_id/transmission-history",
            get(project_history),
        )
        .route(
            "/projects/:project_id/transmission-history/export",
            get(export_project_history),
        )
        .route(
            "/projects/:project_id/transmission-stats",
            get(project_stats),
        )
        .route("/projects/:project_id/validate", get(validate_project))
        .route("/projects/:project_id/operations", get(project_operations))
}

/// 组装完整应用：/ 与 /api 双前缀、请求上下文、访问日志与上传体积限制
pub fn build_app(state: AppState) -> Router {
    let body_limit = state.upload_max_bytes + MULTIPART_OVERHEAD_BYTES;
    let api = create_api_router();
    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{REQUEST_ID_HEADER, TRACE_ID_HEADER};
    use crate::test_support::{body_json, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_is_served_under_both_prefixes() {
        for path in ["/health", "/api/health"] {
            let response = build_app(test_state())
                .oneshot(Request::get(path).body(Body::empty()).expect("request"))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().contains_key(REQUEST_ID_HEADER));
            assert!(response.headers().contains_key(TRACE_ID_HEADER));
        }
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let response = build_app(test_state())
            .oneshot(
                Request::get("/api/devices")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");
    }

    #[tokio::test]
    async fn create_and_fetch_device_over_http() {
        let app = build_app(test_state());
        let response = app
            .clone()
            .oneshot(
                Request::post("/devices")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-actor", "operator")
                    .body(Body::from(r#"{"name":"Boiler","device_type":"Sensor"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let id = body["id"].as_str().expect("id").to_string();
        assert_eq!(body["device_type"], "Sensor");

        let response = app
            .oneshot(
                Request::get(format!("/api/devices/{id}/transmission-state"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["state"], "INACTIVE");
    }

    #[tokio::test]
    async fn static_connection_routes_win_over_id_routes() {
        let response = build_app(test_state())
            .oneshot(
                Request::get("/connections/types")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["types"].is_array());
    }

    #[tokio::test]
    async fn blank_actor_is_rejected() {
        let response = build_app(test_state())
            .oneshot(
                Request::get("/projects")
                    .header("x-actor", " ")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
