//! Prometheus metrics

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return the render handle.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("metrics recorder can only be installed once")
}

/// Record one completed request at a phase granularity.
pub fn record_request(outcome: &'static str) {
    metrics::counter!("finsight_http_requests", "outcome" => outcome).increment(1);
}

/// Record a validation verdict score.
pub fn record_validation_score(score: f64) {
    metrics::histogram!("finsight_validation_score").record(score);
}
