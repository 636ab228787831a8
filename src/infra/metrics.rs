//! Prometheus 指标：登录、token 校验、门禁判定、设备指令转发
//!
//! 通过 `init()` 安装全局 Recorder，通过 HTTP GET `/metrics` 暴露抓取端点。

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::OnceLock;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标名称
const COUNTER_LOGIN_TOTAL: &str = "ownsa_login_total";
const COUNTER_TOKEN_VERIFY_TOTAL: &str = "ownsa_token_verify_total";
const COUNTER_ACCESS_DECISION_TOTAL: &str = "ownsa_access_decision_total";
const COUNTER_RELAY_TOTAL: &str = "ownsa_device_relay_total";
const HISTOGRAM_RELAY_DURATION: &str = "ownsa_device_relay_duration_seconds";

/// 初始化 Prometheus 指标（安装全局 Recorder，返回 Handle 用于 HTTP 暴露）。
/// 仅需在进程内调用一次；重复调用会返回 Err。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    HANDLE
        .set(handle)
        .map_err(|_| "metrics already initialized")?;
    Ok(())
}

/// 渲染当前指标为 Prometheus 文本格式，供 GET /metrics 使用。
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// 记录一次登录结果（success / failure）
pub fn record_login(result: &'static str) {
    metrics::counter!(COUNTER_LOGIN_TOTAL, "result" => result).increment(1);
}

/// 记录一次 token 校验结果
pub fn record_token_verify(result: &'static str) {
    metrics::counter!(COUNTER_TOKEN_VERIFY_TOTAL, "result" => result).increment(1);
}

/// 记录一次门禁判定
pub fn record_access_decision(decision: &'static str) {
    metrics::counter!(COUNTER_ACCESS_DECISION_TOTAL, "decision" => decision).increment(1);
}

/// 记录一次设备后端调用：次数 + 耗时
pub fn record_relay(op: &'static str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!(COUNTER_RELAY_TOTAL, "op" => op, "outcome" => outcome).increment(1);
    metrics::histogram!(HISTOGRAM_RELAY_DURATION, "op" => op).record(duration_secs);
}
