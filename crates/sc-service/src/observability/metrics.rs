//! Metrics definitions for the Signaling Coordinator
//!
//! All metrics follow Prometheus naming conventions:
//! - `sc_` prefix for Signaling Coordinator
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `actor_type`: 2 values (session, connection)
//! - `message_type`: bounded by inbound kinds (11 values)
//! - `kind`: bounded by negotiation kinds (3 values)
//! - `outcome`: a handful of fixed strings per metric
//! - `error_type`: bounded by `ScError::error_type_label`
//!
//! Session and user identifiers are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded. Message latency buckets
/// target p99 < 100ms for signaling messages; admission buckets cover a
/// verifier call that may take up to the admission window.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("sc_message".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set message latency buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("sc_admission".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set admission latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Population Gauges
// ============================================================================

/// Set the number of admitted WebSocket connections.
///
/// Metric: `sc_connections_active`
pub fn set_connections_active(count: u64) {
    // u64 to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_connections_active").set(count as f64);
}

/// Set the number of live sessions.
///
/// Metric: `sc_sessions_active`
pub fn set_sessions_active(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_sessions_active").set(count as f64);
}

/// Set the number of participant records across all sessions.
///
/// Metric: `sc_participants_active`
pub fn set_participants_active(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_participants_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `sc_actor_mailbox_depth`
/// Labels: `actor_type` (session, connection)
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

// ============================================================================
// Admission
// ============================================================================

/// Record an admission attempt.
///
/// Metric: `sc_admissions_total`, `sc_admission_duration_seconds`
/// Labels: `outcome` (accepted, rejected, missing, timeout)
pub fn record_admission(outcome: &'static str, duration: Duration) {
    counter!("sc_admissions_total", "outcome" => outcome).increment(1);
    histogram!("sc_admission_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Message Processing
// ============================================================================

/// Record a processed inbound message and its latency.
///
/// Metric: `sc_messages_total`, `sc_message_latency_seconds`
/// Labels: `message_type`
///
/// SLO target: p99 < 100ms for signaling messages
pub fn record_message(message_type: &'static str, duration: Duration) {
    counter!("sc_messages_total", "message_type" => message_type).increment(1);
    histogram!("sc_message_latency_seconds", "message_type" => message_type)
        .record(duration.as_secs_f64());
}

/// Record a relay attempt.
///
/// Metric: `sc_relay_total`
/// Labels: `kind` (offer, answer, ice-candidate), `outcome` (delivered, dropped, rejected)
pub fn record_relay(kind: &'static str, outcome: &'static str) {
    counter!("sc_relay_total", "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record the number of recipients of one broadcast.
///
/// Metric: `sc_broadcast_recipients_total`
pub fn record_broadcast(recipients: usize) {
    counter!("sc_broadcast_recipients_total").increment(recipients as u64);
}

/// Record an outbound frame dropped because the connection queue was full or closed.
///
/// Metric: `sc_outbound_dropped_total`
/// Labels: `reason` (full, closed)
pub fn record_outbound_dropped(reason: &'static str) {
    counter!("sc_outbound_dropped_total", "reason" => reason).increment(1);
}

/// Record an error reported to a client.
///
/// Metric: `sc_errors_total`
/// Labels: `error_type`
pub fn record_error(error_type: &'static str) {
    counter!("sc_errors_total", "error_type" => error_type).increment(1);
}

// ============================================================================
// Actors
// ============================================================================

/// Record an actor panic.
///
/// Metric: `sc_actor_panics_total`
/// Labels: `actor_type`
pub fn record_actor_panic(actor_type: &str) {
    counter!("sc_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}

// ============================================================================
// Attendance
// ============================================================================

/// Record an attendance delivery outcome.
///
/// Metric: `sc_attendance_total`
/// Labels: `event` (join, leave), `outcome` (recorded, failed, dropped)
pub fn record_attendance(event: &'static str, outcome: &'static str) {
    counter!("sc_attendance_total", "event" => event, "outcome" => outcome).increment(1);
}
