//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ddns_hooks_total` (counter): lifecycle hooks by phase, outcome
//! - `ddns_sessions_total` (counter): session operations by op, backend, outcome
//! - `ddns_http_requests_total` (counter): web requests by route, status
//! - `ddns_lifecycle_state` (gauge): 0=not started, 1=running, 2=stopping, 3=stopped
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::lifecycle::LifecycleState;
use crate::session::SessionBackendKind;

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_hook(phase: &'static str, outcome: &'static str) {
    ::metrics::counter!("ddns_hooks_total", "phase" => phase, "outcome" => outcome).increment(1);
}

pub fn record_session(op: &'static str, backend: SessionBackendKind, outcome: &'static str) {
    ::metrics::counter!(
        "ddns_sessions_total",
        "op" => op,
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_request(route: &'static str, status: u16) {
    ::metrics::counter!("ddns_http_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
}

pub fn record_state(state: LifecycleState) {
    let value = match state {
        LifecycleState::NotStarted => 0.0,
        LifecycleState::Running => 1.0,
        LifecycleState::Stopping => 2.0,
        LifecycleState::Stopped => 3.0,
    };
    ::metrics::gauge!("ddns_lifecycle_state").set(value);
}
