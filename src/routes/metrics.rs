use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for the counters and gauges the web tier emits.
pub fn describe() {
    metrics::describe_counter!("jobs_submitted_total", "Jobs accepted, by job type");
    metrics::describe_counter!("jobs_dispatched_total", "Job ids pushed onto a queue, by queue");
    metrics::describe_counter!(
        "job_dispatch_failures_total",
        "Queue pushes that failed and were left to the outbox relay"
    );
    metrics::describe_counter!("speech_requests_total", "Speech synthesis requests, by outcome");
    metrics::describe_gauge!("job_outbox_depth", "Committed jobs not yet pushed to a queue");
}

/// Prometheus scrape endpoint, text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
