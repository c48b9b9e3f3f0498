//! Registry wired to mock collaborators.

use crate::mock_access::MockAccessChecker;
use crate::mock_attendance::RecordingAttendanceRecorder;
use crate::mock_verifier::principal;
use crate::test_client::TestClient;
use sc_service::actors::{ActorMetrics, SessionRegistry};
use sc_service::auth::Principal;
use sc_service::protocol::Role;
use sc_service::tasks::{AttendanceDispatcher, AttendanceDispatcherConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Outbound queue depth used by harness clients.
pub const TEST_CONNECTION_BUFFER: usize = 64;

/// A `SessionRegistry` plus the mocks behind it.
pub struct TestHarness {
    pub registry: SessionRegistry,
    pub access: Arc<MockAccessChecker>,
    pub attendance: Arc<RecordingAttendanceRecorder>,
    pub metrics: Arc<ActorMetrics>,
    attendance_token: CancellationToken,
    attendance_task: JoinHandle<()>,
}

impl TestHarness {
    /// Harness that allows every session and records attendance.
    pub fn new() -> Self {
        Self::with_collaborators(
            MockAccessChecker::allowing(),
            RecordingAttendanceRecorder::new(),
        )
    }

    pub fn with_access(access: MockAccessChecker) -> Self {
        Self::with_collaborators(access, RecordingAttendanceRecorder::new())
    }

    pub fn with_collaborators(
        access: MockAccessChecker,
        attendance: RecordingAttendanceRecorder,
    ) -> Self {
        let access = Arc::new(access);
        let attendance = Arc::new(attendance);
        let attendance_token = CancellationToken::new();
        let (dispatcher, attendance_task) = AttendanceDispatcher::start(
            attendance.clone(),
            AttendanceDispatcherConfig {
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                ..AttendanceDispatcherConfig::default()
            },
            attendance_token.clone(),
        );
        let metrics = ActorMetrics::new();
        let registry = SessionRegistry::new(
            access.clone(),
            dispatcher,
            Arc::clone(&metrics),
            CancellationToken::new(),
        );
        Self {
            registry,
            access,
            attendance,
            metrics,
            attendance_token,
            attendance_task,
        }
    }

    /// Admit an attendee.
    pub fn client(&self, identity: &str) -> TestClient {
        self.client_for(principal(identity, Role::Attendee))
    }

    /// Admit a presenter.
    pub fn presenter(&self, identity: &str) -> TestClient {
        self.client_for(principal(identity, Role::Presenter))
    }

    pub fn client_for(&self, principal: Principal) -> TestClient {
        TestClient::connect(&self.registry, principal, TEST_CONNECTION_BUFFER)
    }

    /// Shut the registry down and drain the attendance queue.
    pub async fn shutdown(self) {
        self.registry.shutdown(Duration::from_secs(5)).await;
        self.attendance_token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.attendance_task).await;
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
