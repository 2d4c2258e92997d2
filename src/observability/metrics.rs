//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_http_requests_total` (counter): relayed requests by method, status
//! - `relay_http_request_duration_seconds` (histogram): latency by method
//! - `relay_http_upstream_errors_total` (counter): upstream transport failures
//! - `relay_auth_rejections_total` (counter): requests refused by the gate
//! - `relay_websocket_pairs_active` (gauge): open connection pairs
//! - `relay_websocket_frames_total` (counter): frames relayed by direction
//! - `relay_websocket_upstream_errors_total` (counter): upstream socket failures
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(err) => tracing::error!(error = %err, "Failed to install metrics exporter"),
    }
}

/// One finished HTTP relay.
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    let method = method.to_string();
    counter!(
        "relay_http_requests_total",
        "method" => method.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_http_request_duration_seconds", "method" => method)
        .record(start_time.elapsed().as_secs_f64());
}

pub fn record_upstream_error() {
    counter!("relay_http_upstream_errors_total").increment(1);
}

pub fn record_auth_rejection() {
    counter!("relay_auth_rejections_total").increment(1);
}

/// A frame written towards `direction` (`"client"` or `"upstream"`).
pub fn record_ws_frame(direction: &'static str) {
    counter!("relay_websocket_frames_total", "direction" => direction).increment(1);
}

pub fn record_ws_upstream_error() {
    counter!("relay_websocket_upstream_errors_total").increment(1);
}

pub fn ws_pair_opened() {
    gauge!("relay_websocket_pairs_active").increment(1.0);
}

pub fn ws_pair_closed() {
    gauge!("relay_websocket_pairs_active").decrement(1.0);
}
