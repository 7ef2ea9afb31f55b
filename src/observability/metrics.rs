//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mediator_requests_total` (counter): requests by method, status, outcome
//! - `mediator_request_duration_seconds` (histogram): latency by outcome
//! - `mediator_decision_failures_total` (counter): fail-open triggers by kind
//! - `mediator_exposures_total` (counter): exposure deliveries by result
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished mediator request.
pub fn record_request(method: &str, status: u16, outcome: &'static str, start: Instant) {
    metrics::counter!(
        "mediator_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    metrics::histogram!("mediator_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Record a decision failure that triggered fail-open.
pub fn record_decision_failure(kind: &'static str) {
    metrics::counter!("mediator_decision_failures_total", "kind" => kind).increment(1);
}

/// Record an exposure delivery result.
pub fn record_exposure(result: &'static str) {
    metrics::counter!("mediator_exposures_total", "result" => result).increment(1);
}
