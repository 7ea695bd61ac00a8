//! Prometheus metrics for dispatcher observability.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a webhook received event.
pub fn webhook_received(event_type: &str) {
    counter!("dispatch_webhooks_received_total", "event" => event_type.to_string()).increment(1);
}

/// Record an event state transition.
pub fn event_status_changed(status: &str) {
    counter!("dispatch_events_total", "status" => status.to_string()).increment(1);
}

/// Record a trigger attempt outcome.
pub fn trigger_result(rule: &str, ok: bool) {
    let outcome = if ok { "success" } else { "failure" };
    counter!(
        "dispatch_triggers_total",
        "rule" => rule.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a capacity denial for a pipeline.
pub fn capacity_unavailable(pipeline: &str) {
    counter!("dispatch_capacity_unavailable_total", "pipeline" => pipeline.to_string())
        .increment(1);
}

/// Record tick duration.
pub fn tick_duration(duration_ms: u64) {
    histogram!("dispatch_tick_duration_ms").record(duration_ms as f64);
}
