//! Prometheus exposition (spec §6 `GET /metrics`) and the process-wide
//! gauges/histograms the bridge records: active calls, VAD windows
//! processed, and (via `callbridge-engine`'s `AudioMessage`) per-call
//! `synthesize` latency (spec §4.6, §12).

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the process-wide Prometheus recorder. Call once at startup.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

pub fn record_call_started() {
    metrics::counter!("callbridge_calls_started_total").increment(1);
}

pub fn record_call_ended(status: &str) {
    metrics::counter!("callbridge_calls_ended_total", "status" => status.to_string()).increment(1);
}

pub fn set_active_calls(count: usize) {
    metrics::gauge!("callbridge_active_calls").set(count as f64);
}
