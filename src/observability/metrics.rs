//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define network core metrics (traffic, HTTP outcomes, open handles)
//! - Expose a Prometheus-compatible endpoint when the host asks for one
//!
//! # Metrics
//! - `network_upload_bytes_total` (counter): bytes sent over TCP connections
//! - `network_download_bytes_total` (counter): bytes received over TCP connections
//! - `network_http_requests_total` (counter): completed HTTP requests by method, status
//! - `network_open_connections` (gauge): registered connections after a tick
//! - `network_open_listeners` (gauge): registered listeners after a tick
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Traffic is recorded from drained deltas, so nothing is counted twice

use std::net::SocketAddr;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    let result = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install();

    match result {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record TCP traffic drained during one tick.
pub fn record_traffic(upload: usize, download: usize) {
    if upload > 0 {
        ::metrics::counter!("network_upload_bytes_total").increment(upload as u64);
    }
    if download > 0 {
        ::metrics::counter!("network_download_bytes_total").increment(download as u64);
    }
}

/// Record the outcome of one HTTP request (502 for transport failures).
pub fn record_http_result(method: &'static str, status: u16) {
    ::metrics::counter!(
        "network_http_requests_total",
        "method" => method,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record how many connections and listeners are registered.
pub fn record_registry(connections: usize, listeners: usize) {
    ::metrics::gauge!("network_open_connections").set(connections as f64);
    ::metrics::gauge!("network_open_listeners").set(listeners as f64);
}
