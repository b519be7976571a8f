//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define runtime metrics (connections, requests, transfers, faults)
//! - Expose a Prometheus-compatible endpoint when enabled
//!
//! # Metrics
//! - `tickloop_connections_accepted_total` (counter)
//! - `tickloop_open_connections` (gauge): connections not yet reaped
//! - `tickloop_requests_total` (counter): requests dispatched, by method
//! - `tickloop_transfers_started_total` (counter): by kind
//! - `tickloop_transfers_rejected_total` (counter): cap reached
//! - `tickloop_transfers_completed_total` (counter): by kind, outcome
//! - `tickloop_application_faults_total` (counter): by callback
//! - `tickloop_log_lines_dropped_total` (counter): push queue full
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_accepted() {
    ::metrics::counter!("tickloop_connections_accepted_total").increment(1);
}

pub fn record_open_connections(count: usize) {
    ::metrics::gauge!("tickloop_open_connections").set(count as f64);
}

pub fn record_request(method: &'static str) {
    ::metrics::counter!("tickloop_requests_total", "method" => method).increment(1);
}

pub fn record_transfer_started(kind: &'static str) {
    ::metrics::counter!("tickloop_transfers_started_total", "kind" => kind).increment(1);
}

pub fn record_transfer_rejected() {
    ::metrics::counter!("tickloop_transfers_rejected_total").increment(1);
}

pub fn record_transfer_completed(kind: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "failed" };
    ::metrics::counter!(
        "tickloop_transfers_completed_total",
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_application_fault(callback: &'static str) {
    ::metrics::counter!("tickloop_application_faults_total", "callback" => callback).increment(1);
}

pub fn record_log_lines_dropped(count: u64) {
    ::metrics::counter!("tickloop_log_lines_dropped_total").increment(count);
}
