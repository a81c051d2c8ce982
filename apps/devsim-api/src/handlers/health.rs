//! 健康检查与指标快照

use crate::AppState;
use api_contract::MetricsSnapshotDto;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use devsim_telemetry::metrics;

/// 健康检查：只反映进程存活
///
/// JSON 响应：`{"ok": true}`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

/// 进程级计数器快照，附带当前武装的调度数
pub async fn metrics_snapshot(State(state): State<AppState>) -> Response {
    let snapshot = metrics().snapshot();
    let dto = MetricsSnapshotDto {
        manual_transmissions: snapshot.manual_transmissions,
        automatic_transmissions: snapshot.automatic_transmissions,
        transmission_success: snapshot.transmission_success,
        transmission_failure: snapshot.transmission_failure,
        transmission_timeouts: snapshot.transmission_timeouts,
        transmission_latency_ms_total: snapshot.transmission_latency_ms_total,
        transmission_latency_ms_count: snapshot.transmission_latency_ms_count,
        scheduler_ticks: snapshot.scheduler_ticks,
        scheduler_ticks_skipped: snapshot.scheduler_ticks_skipped,
        armed_devices: state.controller.scheduler().armed_count() as u64,
        bulk_operations: snapshot.bulk_operations,
        csv_staged: snapshot.csv_staged,
        csv_committed: snapshot.csv_committed,
        connection_tests: snapshot.connection_tests,
    };
    (StatusCode::OK, Json(dto)).into_response()
}
