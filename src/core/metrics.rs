// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    /// The number of subscriber sessions currently attached to this process.
    pub static ref CONNECTED_SESSIONS: Gauge =
        register_gauge!("livecfg_connected_sessions", "Number of currently attached subscriber sessions.").unwrap();
    /// The number of projects held by the storage backend, refreshed on scrape.
    pub static ref PROJECT_COUNT: Gauge =
        register_gauge!("livecfg_project_count", "Number of projects known to the storage backend.").unwrap();

    /// The total number of pull frames received since startup.
    pub static ref PULLS_TOTAL: Counter =
        register_counter!("livecfg_pulls_total", "Total number of pull frames received.").unwrap();
    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("livecfg_connections_received_total", "Total number of connections received.").unwrap();
    /// The total number of push frames sent, labeled by response mode ("notify"/"reply").
    pub static ref PUSHES_TOTAL: CounterVec =
        register_counter_vec!("livecfg_pushes_total", "Total number of push frames sent, labeled by response mode.", &["response_mode"]).unwrap();
    /// The total number of `nochange` decisions sent in response to a pull.
    pub static ref NOCHANGE_TOTAL: Counter =
        register_counter!("livecfg_nochange_total", "Total number of pulls answered with no change.").unwrap();

    /// A histogram of resolver latencies, covering both pull- and change-driven resolutions.
    pub static ref RESOLVE_LATENCY_SECONDS: Histogram =
        register_histogram!("livecfg_resolve_latency_seconds", "Latency of project resolution in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
