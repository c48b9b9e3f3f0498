//! Recording attendance recorder.

use async_trait::async_trait;
use common::types::{SessionId, UserId};
use sc_service::errors::ScError;
use sc_service::services::attendance::{AttendanceEvent, AttendanceKind, AttendanceRecorder};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Attendance recorder that keeps every delivered event in memory.
///
/// Can be configured to fail a number of attempts first, or always.
#[derive(Debug, Default)]
pub struct RecordingAttendanceRecorder {
    events: Mutex<Vec<AttendanceEvent>>,
    failures_remaining: AtomicU32,
    always_fail: bool,
    attempts: AtomicUsize,
}

impl RecordingAttendanceRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` attempts, then succeed.
    #[must_use]
    pub fn failing_first(n: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(n),
            ..Self::default()
        }
    }

    /// Fail every attempt.
    #[must_use]
    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Successfully recorded events, in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<AttendanceEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Recorded `(identity, kind)` pairs for one session.
    #[must_use]
    pub fn events_for(&self, session_id: &str) -> Vec<(UserId, AttendanceKind)> {
        let session_id = SessionId::new(session_id);
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.session_id == session_id)
            .map(|e| (e.identity.clone(), e.kind))
            .collect()
    }

    /// Total delivery attempts, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` events were recorded or `timeout` passes.
    pub async fn wait_for_events(&self, count: usize, timeout: Duration) -> Vec<AttendanceEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let events = self.events();
            if events.len() >= count || tokio::time::Instant::now() >= deadline {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl AttendanceRecorder for RecordingAttendanceRecorder {
    async fn record(&self, event: &AttendanceEvent) -> Result<(), ScError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.always_fail {
            return Err(ScError::Attendance("mock recorder failure".to_string()));
        }
        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ScError::Attendance("mock transient failure".to_string()));
        }

        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_first_then_records() {
        let recorder = RecordingAttendanceRecorder::failing_first(1);
        let event = AttendanceEvent::join(SessionId::new("s1"), UserId::new("alice"));

        assert!(recorder.record(&event).await.is_err());
        assert!(recorder.record(&event).await.is_ok());

        assert_eq!(recorder.attempts(), 2);
        assert_eq!(
            recorder.events_for("s1"),
            vec![(UserId::new("alice"), AttendanceKind::Join)]
        );
    }

    #[tokio::test]
    async fn test_always_failing() {
        let recorder = RecordingAttendanceRecorder::always_failing();
        let event = AttendanceEvent::leave(SessionId::new("s1"), UserId::new("alice"));
        assert!(recorder.record(&event).await.is_err());
        assert!(recorder.events().is_empty());
    }
}
