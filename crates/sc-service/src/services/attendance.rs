//! Attendance recording against the LMS.
//!
//! Recording is best-effort: the session actors hand events to the
//! [`AttendanceDispatcher`](crate::tasks::attendance::AttendanceDispatcher),
//! which calls an [`AttendanceRecorder`] off the join/leave path.

use crate::errors::ScError;
use crate::services::LmsEndpoint;
use chrono::{DateTime, Utc};
use common::types::{SessionId, UserId};
use serde::Serialize;
use tracing::instrument;

/// Join or leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceKind {
    Join,
    Leave,
}

impl AttendanceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceKind::Join => "join",
            AttendanceKind::Leave => "leave",
        }
    }
}

/// One attendance fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEvent {
    pub session_id: SessionId,
    pub identity: UserId,
    pub kind: AttendanceKind,
    pub occurred_at: DateTime<Utc>,
}

impl AttendanceEvent {
    #[must_use]
    pub fn join(session_id: SessionId, identity: UserId) -> Self {
        Self {
            session_id,
            identity,
            kind: AttendanceKind::Join,
            occurred_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn leave(session_id: SessionId, identity: UserId) -> Self {
        Self {
            session_id,
            identity,
            kind: AttendanceKind::Leave,
            occurred_at: Utc::now(),
        }
    }
}

/// Durable log of join/leave timestamps.
#[async_trait::async_trait]
pub trait AttendanceRecorder: Send + Sync {
    /// Record one event.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Attendance` if the event was not recorded.
    async fn record(&self, event: &AttendanceEvent) -> Result<(), ScError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceBody<'a> {
    user_id: &'a str,
    event: AttendanceKind,
    occurred_at: DateTime<Utc>,
}

/// `POST {base}/api/live-sessions/{sessionId}/attendance`
pub struct HttpAttendanceClient {
    endpoint: LmsEndpoint,
}

impl HttpAttendanceClient {
    #[must_use]
    pub fn new(endpoint: LmsEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait::async_trait]
impl AttendanceRecorder for HttpAttendanceClient {
    #[instrument(skip_all, fields(session_id = %event.session_id, event = event.kind.as_str()))]
    async fn record(&self, event: &AttendanceEvent) -> Result<(), ScError> {
        let url = self.endpoint.session_url(&event.session_id, "attendance")?;
        let body = AttendanceBody {
            user_id: event.identity.as_str(),
            event: event.kind,
            occurred_at: event.occurred_at,
        };

        let response = self
            .endpoint
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScError::Attendance(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ScError::Attendance(format!(
                "unexpected status {}",
                status.as_u16()
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_attendance_body_wire_shape() {
        let occurred_at = DateTime::parse_from_rfc3339("2026-03-01T10:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let body = AttendanceBody {
            user_id: "u-9",
            event: AttendanceKind::Leave,
            occurred_at,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "userId": "u-9",
                "event": "leave",
                "occurredAt": "2026-03-01T10:15:00Z"
            })
        );
    }

    #[test]
    fn test_event_constructors() {
        let e = AttendanceEvent::join(SessionId::new("s"), UserId::new("u"));
        assert_eq!(e.kind, AttendanceKind::Join);
        assert_eq!(e.kind.as_str(), "join");
        let e = AttendanceEvent::leave(SessionId::new("s"), UserId::new("u"));
        assert_eq!(e.kind, AttendanceKind::Leave);
    }
}
