//! Metrics collection and exposition.
//!
//! # Metrics
//! - `command_requests_total` (counter): dispatches by command and outcome
//! - `command_request_duration_seconds` (histogram): time until the handler returned
//! - `fetch_upstream_requests_total` (counter): outbound calls by mode and outcome
//! - `fetch_stream_chunks_total` (counter): relayed chunks by kind (json, text, error)
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one dispatched request.
pub fn record_command(command: &str, outcome: &'static str, start_time: Instant) {
    counter!(
        "command_requests_total",
        "command" => command.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("command_request_duration_seconds", "command" => command.to_string())
        .record(start_time.elapsed().as_secs_f64());
}

/// Record an outbound fetch.
pub fn record_upstream(mode: &'static str, outcome: &'static str) {
    counter!("fetch_upstream_requests_total", "mode" => mode, "outcome" => outcome).increment(1);
}

/// Record one relayed stream chunk.
pub fn record_stream_chunk(kind: &'static str) {
    counter!("fetch_stream_chunks_total", "kind" => kind).increment(1);
}
