//! Prometheus metrics for grand-ambassador.
//!
//! Tracks active proxy groups, relayed connections and datagrams, and how
//! workload events were handled.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_int_gauge, CounterVec, Encoder, IntGauge, TextEncoder,
};

lazy_static! {
    /// Proxy groups currently registered
    pub static ref ACTIVE_GROUPS: IntGauge = register_int_gauge!(
        "ambassador_active_groups",
        "Number of proxy groups currently serving traffic"
    )
    .unwrap();

    /// Inbound connections accepted by proxy listeners
    pub static ref CONNECTIONS_TOTAL: CounterVec = register_counter_vec!(
        "ambassador_connections_total",
        "Total number of inbound connections accepted",
        &["port", "protocol"]
    )
    .unwrap();

    /// Failed dials to the workload
    pub static ref DIAL_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "ambassador_dial_failures_total",
        "Total number of failed connections to the workload",
        &["port"]
    )
    .unwrap();

    /// Datagrams relayed by UDP proxies
    pub static ref DATAGRAMS_TOTAL: CounterVec = register_counter_vec!(
        "ambassador_datagrams_total",
        "Total number of datagrams relayed",
        &["port", "direction"]  // direction: outbound|reply
    )
    .unwrap();

    /// Workload events seen by the controller
    pub static ref EVENTS_TOTAL: CounterVec = register_counter_vec!(
        "ambassador_events_total",
        "Total number of workload events processed",
        // kind: start|restart|die|stop|kill|other
        // outcome: ignored|stopped|noop|replaced|failed
        &["kind", "outcome"]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_connection(port: u16, protocol: &str) {
    CONNECTIONS_TOTAL
        .with_label_values(&[&port.to_string(), protocol])
        .inc();
}

pub fn record_dial_failure(port: u16) {
    DIAL_FAILURES_TOTAL
        .with_label_values(&[&port.to_string()])
        .inc();
}

pub fn record_datagram(port: u16, direction: &str) {
    DATAGRAMS_TOTAL
        .with_label_values(&[&port.to_string(), direction])
        .inc();
}

/// `kind` is an [`EventKind::label`](crate::directory::EventKind::label).
pub fn record_event(kind: &str, outcome: &str) {
    EVENTS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn set_active_groups(count: usize) {
    ACTIVE_GROUPS.set(count as i64);
}
