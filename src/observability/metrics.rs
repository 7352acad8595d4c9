//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): upstream fetch outcomes by method,
//!   status, origin
//! - `proxy_request_duration_seconds` (histogram): upstream fetch latency
//! - `proxy_cache_events_total` (counter): cache hits and misses
//! - `proxy_cache_entries` (gauge): current cache size
//! - `proxy_circuit_transitions_total` (counter): breaker transitions by
//!   origin and new state
//!
//! All recorders are no-ops until `init_metrics` installs the Prometheus
//! exporter, so library code can record unconditionally.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one upstream fetch outcome. `status` 0 means no response was
/// obtained (network error, timeout, exhausted retries).
pub fn record_request(method: &str, status: u16, origin: &str, duration: Duration) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "origin" => origin.to_string(),
    )
    .increment(1);
    histogram!(
        "proxy_request_duration_seconds",
        "origin" => origin.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a cache read result ("hit" or "miss").
pub fn record_cache_event(result: &'static str) {
    counter!("proxy_cache_events_total", "result" => result).increment(1);
}

/// Track the current number of cache entries.
pub fn record_cache_size(entries: usize) {
    gauge!("proxy_cache_entries").set(entries as f64);
}

/// Record a circuit breaker state transition.
pub fn record_circuit_transition(origin: &str, state: &'static str) {
    counter!(
        "proxy_circuit_transitions_total",
        "origin" => origin.to_string(),
        "state" => state,
    )
    .increment(1);
}
