//! Metrics instrumentation for cluster-dns.
//!
//! All metrics are prefixed with `cluster_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query handled by the front end.
pub fn record_query(kind: QueryKind, result: QueryResult, duration: std::time::Duration) {
    let kind_str = match kind {
        QueryKind::Forward => "forward",
        QueryKind::Reverse => "reverse",
    };
    let result_str = match result {
        QueryResult::Success => "success",
        QueryResult::NotFound => "not_found",
        QueryResult::BadRequest => "bad_request",
        QueryResult::NotReady => "not_ready",
        QueryResult::Error => "error",
    };

    counter!("cluster_dns.query.count", "kind" => kind_str, "result" => result_str).increment(1);
    histogram!("cluster_dns.query.duration.seconds", "kind" => kind_str)
        .record(duration.as_secs_f64());
}

/// Query kind for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryKind {
    /// Name-to-records lookup.
    Forward,
    /// PTR lookup.
    Reverse,
}

/// Query outcome for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query returned records.
    Success,
    /// Name not present.
    NotFound,
    /// Query could not be classified.
    BadRequest,
    /// Initial sync incomplete.
    NotReady,
    /// Query failed with an error.
    Error,
}

/// Record a reconciler event.
pub fn record_reconcile_event(resource: &str, op: ReconcileOp) {
    let op_str = match op {
        ReconcileOp::Add => "add",
        ReconcileOp::Update => "update",
        ReconcileOp::Delete => "delete",
    };
    counter!("cluster_dns.reconcile.event.count", "resource" => resource.to_string(), "op" => op_str)
        .increment(1);
}

/// Reconciler operations.
#[derive(Debug, Clone, Copy)]
pub enum ReconcileOp {
    /// Object added.
    Add,
    /// Object updated.
    Update,
    /// Object deleted.
    Delete,
}

/// Record a reconciler event that was dropped rather than applied.
pub fn record_event_dropped(resource: &str, reason: &str) {
    counter!("cluster_dns.reconcile.dropped.count", "resource" => resource.to_string(), "reason" => reason.to_string())
        .increment(1);
}

/// Record state sizes (call periodically or on change).
pub fn record_state_counts(services: usize, endpoints: usize, reverse: usize, cluster_ips: usize) {
    gauge!("cluster_dns.state.services.count").set(services as f64);
    gauge!("cluster_dns.state.endpoints.count").set(endpoints as f64);
    gauge!("cluster_dns.state.reverse_entries.count").set(reverse as f64);
    gauge!("cluster_dns.state.cluster_ips.count").set(cluster_ips as f64);
}

/// Record readiness state.
pub fn record_ready_state(services_synced: bool, endpoints_synced: bool) {
    gauge!("cluster_dns.state.services_synced").set(if services_synced { 1.0 } else { 0.0 });
    gauge!("cluster_dns.state.endpoints_synced").set(if endpoints_synced { 1.0 } else { 0.0 });
}

/// Record the zone serial.
pub fn record_serial(serial: u32) {
    gauge!("cluster_dns.state.serial").set(serial as f64);
}

/// Record the outcome of a dynamic configuration update.
pub fn record_config_update(applied: bool) {
    let result = if applied { "applied" } else { "rejected" };
    counter!("cluster_dns.config.update.count", "result" => result).increment(1);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
