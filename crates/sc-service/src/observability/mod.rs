//! Observability for the Signaling Coordinator service
//!
//! # Privacy by Default
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit fields.
//! Credential tokens and payloads are never logged. Metric labels are
//! bounded; session and user identifiers appear in logs only.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `sc_connections_active` | Gauge | none | Admitted WebSocket connections |
//! | `sc_sessions_active` | Gauge | none | Live sessions |
//! | `sc_participants_active` | Gauge | none | Participant records |
//! | `sc_admissions_total` | Counter | `outcome` | Admission results |
//! | `sc_messages_total` | Counter | `message_type` | Inbound messages processed |
//! | `sc_message_latency_seconds` | Histogram | `message_type` | Processing latency |
//! | `sc_relay_total` | Counter | `kind`, `outcome` | Negotiation relays |
//! | `sc_broadcast_recipients_total` | Counter | none | Fan-out deliveries |
//! | `sc_errors_total` | Counter | `error_type` | Errors reported to clients |
//! | `sc_outbound_dropped_total` | Counter | `reason` | Frames dropped at full queues |
//! | `sc_attendance_total` | Counter | `event`, `outcome` | Attendance deliveries |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
