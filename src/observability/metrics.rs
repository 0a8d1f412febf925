//! Metrics collection and exposition.
//!
//! # Metrics
//! - `oauth_proxy_requests_total` (counter): proxied HTTP requests by method, status
//! - `oauth_proxy_request_duration_seconds` (histogram): time to response head
//! - `oauth_proxy_state_rewrites_total` (counter): repaired OAuth callbacks
//! - `oauth_proxy_upstream_errors_total` (counter): backend failures by path kind
//! - `oauth_proxy_websocket_active` (gauge): open bridges
//! - `oauth_proxy_websocket_bytes_total` (counter): spliced bytes by direction
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "oauth_proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("oauth_proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_state_rewrite() {
    counter!("oauth_proxy_state_rewrites_total").increment(1);
}

/// `kind` is `"http"` or `"websocket"`.
pub fn record_upstream_error(kind: &'static str) {
    counter!("oauth_proxy_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_spliced_bytes(client_to_backend: u64, backend_to_client: u64) {
    counter!("oauth_proxy_websocket_bytes_total", "direction" => "client_to_backend")
        .increment(client_to_backend);
    counter!("oauth_proxy_websocket_bytes_total", "direction" => "backend_to_client")
        .increment(backend_to_client);
}

/// Holds the active-bridge gauge up for as long as it lives.
#[derive(Debug)]
pub struct ActiveBridge(());

impl ActiveBridge {
    pub fn open() -> Self {
        gauge!("oauth_proxy_websocket_active").increment(1.0);
        Self(())
    }
}

impl Drop for ActiveBridge {
    fn drop(&mut self) {
        gauge!("oauth_proxy_websocket_active").decrement(1.0);
    }
}
