//! 追踪、请求 ID 生成与传输指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub manual_transmissions: u64,
    pub automatic_transmissions: u64,
    pub transmission_success: u64,
    pub transmission_failure: u64,
    pub transmission_timeouts: u64,
    pub transmission_latency_ms_total: u64,
    pub transmission_latency_ms_count: u64,
    pub scheduler_ticks: u64,
    pub scheduler_ticks_skipped: u64,
    pub bulk_operations: u64,
    pub csv_staged: u64,
    pub csv_committed: u64,
    pub connection_tests: u64,
}

/// 进程级传输指标。
pub struct TelemetryMetrics {
    manual_transmissions: AtomicU64,
    automatic_transmissions: AtomicU64,
    transmission_success: AtomicU64,
    transmission_failure: AtomicU64,
    transmission_timeouts: AtomicU64,
    transmission_latency_ms_total: AtomicU64,
    transmission_latency_ms_count: AtomicU64,
    scheduler_ticks: AtomicU64,
    scheduler_ticks_skipped: AtomicU64,
    bulk_operations: AtomicU64,
    csv_staged: AtomicU64,
    csv_committed: AtomicU64,
    connection_tests: AtomicU64,
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            manual_transmissions: AtomicU64::new(0),
            automatic_transmissions: AtomicU64::new(0),
            transmission_success: AtomicU64::new(0),
            transmission_failure: AtomicU64::new(0),
            transmission_timeouts: AtomicU64::new(0),
            transmission_latency_ms_total: AtomicU64::new(0),
            transmission_latency_ms_count: AtomicU64::new(0),
            scheduler_ticks: AtomicU64::new(0),
            scheduler_ticks_skipped: AtomicU64::new(0),
            bulk_operations: AtomicU64::new(0),
            csv_staged: AtomicU64::new(0),
            csv_committed: AtomicU64::new(0),
            connection_tests: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            manual_transmissions: self.manual_transmissions.load(Ordering::Relaxed),
            automatic_transmissions: self.automatic_transmissions.load(Ordering::Relaxed),
            transmission_success: self.transmission_success.load(Ordering::Relaxed),
            transmission_failure: self.transmission_failure.load(Ordering::Relaxed),
            transmission_timeouts: self.transmission_timeouts.load(Ordering::Relaxed),
            transmission_latency_ms_total: self
                .transmission_latency_ms_total
                .load(Ordering::Relaxed),
            transmission_latency_ms_count: self
                .transmission_latency_ms_count
                .load(Ordering::Relaxed),
            scheduler_ticks: self.scheduler_ticks.load(Ordering::Relaxed),
            scheduler_ticks_skipped: self.scheduler_ticks_skipped.load(Ordering::Relaxed),
            bulk_operations: self.bulk_operations.load(Ordering::Relaxed),
            csv_staged: self.csv_staged.load(Ordering::Relaxed),
            csv_committed: self.csv_committed.load(Ordering::Relaxed),
            connection_tests: self.connection_tests.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录一次传输尝试（手动或自动）。
pub fn record_transmission_attempt(automatic: bool) {
    let metrics = metrics();
    if automatic {
        metrics
            .automatic_transmissions
            .fetch_add(1, Ordering::Relaxed);
    } else {
        metrics.manual_transmissions.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录投递成功次数。
pub fn record_transmission_success() {
    metrics().transmission_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录投递失败次数（含超时）。
pub fn record_transmission_failure() {
    metrics().transmission_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录投递超时次数。
pub fn record_transmission_timeout() {
    metrics().transmission_timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录投递耗时（毫秒）。
pub fn record_transmission_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .transmission_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .transmission_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录调度器触发次数。
pub fn record_scheduler_tick() {
    metrics().scheduler_ticks.fetch_add(1, Ordering::Relaxed);
}

/// 记录因状态变化而跳过的调度触发。
pub fn record_scheduler_tick_skipped() {
    metrics()
        .scheduler_ticks_skipped
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录项目批量操作次数。
pub fn record_bulk_operation() {
    metrics().bulk_operations.fetch_add(1, Ordering::Relaxed);
}

/// 记录 CSV 暂存次数。
pub fn record_csv_staged() {
    metrics().csv_staged.fetch_add(1, Ordering::Relaxed);
}

/// 记录 CSV 提交次数。
pub fn record_csv_committed() {
    metrics().csv_committed.fetch_add(1, Ordering::Relaxed);
}

/// 记录连接测试次数。
pub fn record_connection_test() {
    metrics().connection_tests.fetch_add(1, Ordering::Relaxed);
}
