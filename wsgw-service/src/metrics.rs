//! Metrics definitions for the gateway.
//!
//! This module defines all metrics keys used by the service and provides a
//! helper [`describe_metrics`] to set metadata for each metric using the
//! `metrics` crate.

/// Metrics key for counting currently open client sessions.
pub const METRICS_ID_CONNECTIONS_OPEN: &str = "wsgw.gateway.connections.open";
/// Metrics key for sessions that terminated with an abnormal close.
pub const METRICS_ID_SESSIONS_CLOSED_ABNORMAL: &str = "wsgw.gateway.sessions.closed.abnormal";
/// Metrics key for pushes delivered to a locally owned connection.
pub const METRICS_ID_PUSH_DELIVERED_LOCAL: &str = "wsgw.gateway.push.delivered.local";
/// Metrics key for pushes forwarded to the owning peer instance.
pub const METRICS_ID_PUSH_FORWARDED: &str = "wsgw.gateway.push.forwarded";
/// Metrics key for pushes addressed to a connection nobody owns.
pub const METRICS_ID_PUSH_UNKNOWN: &str = "wsgw.gateway.push.unknown";
/// Metrics key for relay calls toward the application that failed.
pub const METRICS_ID_RELAY_ERRORS: &str = "wsgw.gateway.relay.errors";
/// Metrics key for the duration of relay calls toward the application.
pub const METRICS_ID_RELAY_DURATION: &str = "wsgw.gateway.relay.duration";

/// Describe all metrics used by the service.
///
/// This calls the `describe_*` functions from the `metrics` crate to set
/// metadata on the different metrics.
pub fn describe_metrics() {
    metrics::describe_gauge!(
        METRICS_ID_CONNECTIONS_OPEN,
        metrics::Unit::Count,
        "Number of currently open client sessions"
    );

    metrics::describe_counter!(
        METRICS_ID_SESSIONS_CLOSED_ABNORMAL,
        metrics::Unit::Count,
        "Number of sessions that terminated with an abnormal close"
    );

    metrics::describe_counter!(
        METRICS_ID_PUSH_DELIVERED_LOCAL,
        metrics::Unit::Count,
        "Number of pushes delivered to a locally owned connection"
    );

    metrics::describe_counter!(
        METRICS_ID_PUSH_FORWARDED,
        metrics::Unit::Count,
        "Number of pushes forwarded to the owning peer instance"
    );

    metrics::describe_counter!(
        METRICS_ID_PUSH_UNKNOWN,
        metrics::Unit::Count,
        "Number of pushes addressed to a connection nobody owns"
    );

    metrics::describe_counter!(
        METRICS_ID_RELAY_ERRORS,
        metrics::Unit::Count,
        "Number of relay calls toward the application that failed"
    );

    metrics::describe_histogram!(
        METRICS_ID_RELAY_DURATION,
        metrics::Unit::Milliseconds,
        "Duration of relay calls toward the application"
    );
}
