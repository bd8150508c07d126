//! Metrics collection and exposition.
//!
//! # Metrics
//! - `greenlight_requests_total` (counter): requests by method and status
//! - `greenlight_request_duration_seconds` (histogram): handler latency
//! - `greenlight_rate_limited_total` (counter): requests denied by admission
//! - `greenlight_limiter_buckets` (gauge): tracked client buckets
//! - `greenlight_active_connections` (gauge): open connections
//! - `greenlight_background_tasks` (gauge): outstanding background tasks
//! - `greenlight_background_failures_total` (counter): failed or panicked tasks
//! - `greenlight_edit_conflicts_total` (counter): rejected conditional updates
//! - `greenlight_drain_timeouts_total` (counter): shutdowns that forced connections closed
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "greenlight_requests_total";
pub const REQUEST_DURATION: &str = "greenlight_request_duration_seconds";
pub const RATE_LIMITED_TOTAL: &str = "greenlight_rate_limited_total";
pub const LIMITER_BUCKETS: &str = "greenlight_limiter_buckets";
pub const ACTIVE_CONNECTIONS: &str = "greenlight_active_connections";
pub const BACKGROUND_TASKS: &str = "greenlight_background_tasks";
pub const BACKGROUND_FAILURES_TOTAL: &str = "greenlight_background_failures_total";
pub const EDIT_CONFLICTS_TOTAL: &str = "greenlight_edit_conflicts_total";
pub const DRAIN_TIMEOUTS_TOTAL: &str = "greenlight_drain_timeouts_total";

/// Install the Prometheus recorder and start its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(metrics_addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(REQUESTS_TOTAL, "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(REQUEST_DURATION, "method" => method.to_string()).record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!(RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_limiter_buckets(count: usize) {
    gauge!(LIMITER_BUCKETS).set(count as f64);
}

pub fn record_active_connections(count: usize) {
    gauge!(ACTIVE_CONNECTIONS).set(count as f64);
}

pub fn record_background_tasks(count: usize) {
    gauge!(BACKGROUND_TASKS).set(count as f64);
}

pub fn record_background_failure(task: &'static str) {
    counter!(BACKGROUND_FAILURES_TOTAL, "task" => task).increment(1);
}

pub fn record_edit_conflict() {
    counter!(EDIT_CONFLICTS_TOTAL).increment(1);
}

pub fn record_drain_timeout() {
    counter!(DRAIN_TIMEOUTS_TOTAL).increment(1);
}
