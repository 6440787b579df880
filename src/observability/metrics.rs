//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_transactions_submitted_total` (counter): submissions by chain and outcome
//! - `bridge_transactions_replaced_total` (counter): accelerate/cancel by chain
//! - `bridge_transfer_transitions_total` (counter): record transitions by target status
//! - `bridge_watcher_cycles_total` (counter): watcher cycles by chain and outcome
//! - `bridge_watcher_scanned_block` (gauge): last checkpointed block per chain
//! - `bridge_client_pool_size` (gauge): cached chain connections

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter. Must be called inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics exporter"),
    }
}

pub fn record_submission(chain_id: u64, outcome: &'static str) {
    metrics::counter!(
        "bridge_transactions_submitted_total",
        "chain_id" => chain_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_replacement(chain_id: u64, kind: &'static str) {
    metrics::counter!(
        "bridge_transactions_replaced_total",
        "chain_id" => chain_id.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_transfer_transition(status: &'static str) {
    metrics::counter!("bridge_transfer_transitions_total", "status" => status).increment(1);
}

pub fn record_watcher_cycle(chain_id: u64, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!(
        "bridge_watcher_cycles_total",
        "chain_id" => chain_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_scanned_block(chain_id: u64, block: u64) {
    metrics::gauge!("bridge_watcher_scanned_block", "chain_id" => chain_id.to_string())
        .set(block as f64);
}

pub fn record_client_pool_size(size: usize) {
    metrics::gauge!("bridge_client_pool_size").set(size as f64);
}
