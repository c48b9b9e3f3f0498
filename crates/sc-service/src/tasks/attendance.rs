//! Attendance dispatcher background task.
//!
//! Session actors enqueue attendance events without waiting; a single worker
//! delivers them to the [`AttendanceRecorder`] in production order, retrying
//! with exponential backoff.
//!
//! # Graceful Shutdown
//!
//! When the cancellation token is triggered the worker stops accepting new
//! events, delivers what is already queued, and exits.

use crate::observability::metrics;
use crate::services::attendance::{AttendanceEvent, AttendanceRecorder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Default delay before the first retry.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Upper bound for the retry delay.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Configuration for the attendance dispatcher.
#[derive(Debug, Clone)]
pub struct AttendanceDispatcherConfig {
    /// Queue capacity; events beyond it are dropped.
    pub queue_capacity: usize,
    /// Delivery attempts per event (at least 1).
    pub max_attempts: u32,
    /// Delay before the first retry, doubled per attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the retry delay.
    pub max_backoff: Duration,
}

impl Default for AttendanceDispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: crate::config::DEFAULT_ATTENDANCE_QUEUE_CAPACITY,
            max_attempts: crate::config::DEFAULT_ATTENDANCE_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Non-blocking handle for enqueueing attendance events.
#[derive(Clone, Debug)]
pub struct AttendanceDispatcher {
    sender: mpsc::Sender<AttendanceEvent>,
}

impl AttendanceDispatcher {
    /// Start the worker task and return the dispatcher plus its task handle.
    pub fn start(
        recorder: Arc<dyn AttendanceRecorder>,
        config: AttendanceDispatcherConfig,
        cancel_token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let task = tokio::spawn(run_attendance_worker(
            receiver,
            recorder,
            config,
            cancel_token,
        ));
        (Self { sender }, task)
    }

    /// Enqueue an event without waiting.
    ///
    /// Returns `false` if the event was dropped because the queue is full or
    /// the worker has stopped.
    pub fn dispatch(&self, event: AttendanceEvent) -> bool {
        let kind = event.kind.as_str();
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    target: "sc.attendance",
                    session_id = %event.session_id,
                    identity = %event.identity,
                    event = kind,
                    "Attendance queue full, dropping event"
                );
                metrics::record_attendance(kind, "dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    target: "sc.attendance",
                    session_id = %event.session_id,
                    event = kind,
                    "Attendance worker stopped, dropping event"
                );
                metrics::record_attendance(kind, "dropped");
                false
            }
        }
    }
}

#[instrument(skip_all, name = "sc.task.attendance")]
async fn run_attendance_worker(
    mut receiver: mpsc::Receiver<AttendanceEvent>,
    recorder: Arc<dyn AttendanceRecorder>,
    config: AttendanceDispatcherConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "sc.attendance",
        queue_capacity = config.queue_capacity,
        max_attempts = config.max_attempts,
        "Starting attendance dispatcher"
    );

    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => break,

            event = receiver.recv() => match event {
                Some(event) => deliver(recorder.as_ref(), &config, &event).await,
                None => {
                    info!(target: "sc.attendance", "All dispatchers dropped, attendance worker exiting");
                    return;
                }
            }
        }
    }

    receiver.close();
    let mut drained = 0usize;
    while let Some(event) = receiver.recv().await {
        deliver(recorder.as_ref(), &config, &event).await;
        drained += 1;
    }
    info!(
        target: "sc.attendance",
        drained = drained,
        "Attendance dispatcher stopped"
    );
}

async fn deliver(
    recorder: &dyn AttendanceRecorder,
    config: &AttendanceDispatcherConfig,
    event: &AttendanceEvent,
) {
    let max_attempts = config.max_attempts.max(1);
    let mut backoff = config.initial_backoff;
    let kind = event.kind.as_str();

    for attempt in 1..=max_attempts {
        match recorder.record(event).await {
            Ok(()) => {
                tracing::debug!(
                    target: "sc.attendance",
                    session_id = %event.session_id,
                    identity = %event.identity,
                    event = kind,
                    attempt = attempt,
                    "Attendance recorded"
                );
                metrics::record_attendance(kind, "recorded");
                return;
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    target: "sc.attendance",
                    session_id = %event.session_id,
                    event = kind,
                    attempt = attempt,
                    error = %e,
                    "Attendance recording failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.max_backoff);
            }
            Err(e) => {
                tracing::error!(
                    target: "sc.attendance",
                    session_id = %event.session_id,
                    identity = %event.identity,
                    event = kind,
                    attempts = attempt,
                    error = %e,
                    "Attendance recording failed, giving up"
                );
                metrics::record_attendance(kind, "failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::ScError;
    use crate::services::attendance::AttendanceKind;
    use common::types::{SessionId, UserId};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` calls, then records.
    struct FlakyRecorder {
        failures: u32,
        calls: AtomicU32,
        recorded: Mutex<Vec<AttendanceEvent>>,
    }

    impl FlakyRecorder {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
                recorded: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl AttendanceRecorder for FlakyRecorder {
        async fn record(&self, event: &AttendanceEvent) -> Result<(), ScError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ScError::Attendance("lms unavailable".to_string()));
            }
            self.recorded.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn event(n: usize) -> AttendanceEvent {
        AttendanceEvent::join(SessionId::new("s1"), UserId::new(format!("u{n}")))
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_delivered_in_order() {
        let recorder = FlakyRecorder::new(0);
        let cancel = CancellationToken::new();
        let (dispatcher, task) = AttendanceDispatcher::start(
            recorder.clone(),
            AttendanceDispatcherConfig::default(),
            cancel.clone(),
        );

        for n in 0..5 {
            assert!(dispatcher.dispatch(event(n)));
        }
        drop(dispatcher);
        task.await.unwrap();

        let recorded = recorder.recorded.lock().unwrap();
        let ids: Vec<_> = recorded.iter().map(|e| e.identity.to_string()).collect();
        assert_eq!(ids, vec!["u0", "u1", "u2", "u3", "u4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delivery_is_retried() {
        let recorder = FlakyRecorder::new(2);
        let cancel = CancellationToken::new();
        let (dispatcher, task) = AttendanceDispatcher::start(
            recorder.clone(),
            AttendanceDispatcherConfig {
                max_attempts: 3,
                ..AttendanceDispatcherConfig::default()
            },
            cancel,
        );

        dispatcher.dispatch(event(1));
        drop(dispatcher);
        task.await.unwrap();

        assert_eq!(recorder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(recorder.recorded.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let recorder = FlakyRecorder::new(u32::MAX);
        let cancel = CancellationToken::new();
        let (dispatcher, task) = AttendanceDispatcher::start(
            recorder.clone(),
            AttendanceDispatcherConfig {
                max_attempts: 2,
                ..AttendanceDispatcherConfig::default()
            },
            cancel,
        );

        dispatcher.dispatch(event(1));
        dispatcher.dispatch(event(2));
        drop(dispatcher);
        task.await.unwrap();

        // Two events, two attempts each.
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 4);
        assert!(recorder.recorded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        // No worker: build the dispatcher around a bare channel.
        let (sender, _receiver) = mpsc::channel(1);
        let dispatcher = AttendanceDispatcher { sender };

        assert!(dispatcher.dispatch(event(1)));
        assert!(!dispatcher.dispatch(event(2)), "second event should be dropped");
    }

    #[tokio::test]
    async fn test_stopped_worker_drops() {
        let (sender, receiver) = mpsc::channel(4);
        drop(receiver);
        let dispatcher = AttendanceDispatcher { sender };
        assert!(!dispatcher.dispatch(event(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_drains_queue() {
        let recorder = FlakyRecorder::new(0);
        let cancel = CancellationToken::new();
        let (dispatcher, task) = AttendanceDispatcher::start(
            recorder.clone(),
            AttendanceDispatcherConfig::default(),
            cancel.clone(),
        );

        for n in 0..3 {
            dispatcher.dispatch(event(n));
        }
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(recorder.recorded.lock().unwrap().len(), 3);
        // After the worker stops, new events are dropped.
        assert!(!dispatcher.dispatch(AttendanceEvent {
            kind: AttendanceKind::Leave,
            ..event(9)
        }));
    }
}
