//! `SessionActor` - one per live session.
//!
//! Owns the session's participant records and serializes every membership
//! and media mutation through its mailbox. Fan-out writes straight into the
//! recipients' outbound queues, so per-sender ordering follows from the
//! single mailbox.
//!
//! # Closing
//!
//! When the last participant leaves, the actor removes its own directory
//! entry (only if the entry still belongs to this generation), replies to
//! the leave, closes its mailbox and answers every queued request with a
//! "session closed" outcome. Joins answered that way are retried by the
//! registry against a fresh session.

use super::connection::ConnectionHandle;
use super::messages::{JoinResult, LeaveOutcome, NewParticipant, SessionMessage, SessionState};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::presence::PresenceEvent;
use super::registry::SessionDirectory;
use crate::errors::ScError;
use crate::observability::metrics as prom;
use crate::protocol::{MediaState, ParticipantInfo, ServerMessage, SignalKind};
use crate::services::attendance::AttendanceEvent;
use crate::tasks::AttendanceDispatcher;
use chrono::{DateTime, Utc};
use common::types::{ConnectionId, SessionId, UserId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 500;

/// Handle to a `SessionActor`.
#[derive(Clone, Debug)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    session_id: SessionId,
    mailbox: Arc<MailboxMonitor>,
}

impl SessionActorHandle {
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Insert or replace a participant.
    ///
    /// Returns `ScError::SessionClosed` if the actor closed before handling
    /// the request.
    pub async fn join(
        &self,
        participant: NewParticipant,
        connection: ConnectionHandle,
    ) -> Result<JoinResult, ScError> {
        let (tx, rx) = oneshot::channel();
        let message = SessionMessage::Join {
            participant,
            connection,
            respond_to: tx,
        };
        if !self.send(message).await {
            return Err(self.closed());
        }
        rx.await.unwrap_or_else(|_| Err(self.closed()))
    }

    /// Remove a participant, optionally only if `connection_id` still owns
    /// the record.
    pub async fn leave(
        &self,
        identity: UserId,
        connection_id: Option<ConnectionId>,
    ) -> LeaveOutcome {
        let (tx, rx) = oneshot::channel();
        let message = SessionMessage::Leave {
            identity,
            connection_id,
            respond_to: tx,
        };
        if !self.send(message).await {
            return LeaveOutcome::NotPresent;
        }
        rx.await.unwrap_or(LeaveOutcome::NotPresent)
    }

    /// Forward a negotiation payload from one participant to another.
    pub async fn relay(
        &self,
        from: UserId,
        connection_id: ConnectionId,
        target: UserId,
        kind: SignalKind,
        payload: Value,
    ) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        let message = SessionMessage::Relay {
            from,
            connection_id,
            target,
            kind,
            payload,
            respond_to: tx,
        };
        if !self.send(message).await {
            return Err(self.not_found());
        }
        rx.await.unwrap_or_else(|_| Err(self.not_found()))
    }

    /// Apply a presence event for `identity` and fan it out.
    pub async fn publish(
        &self,
        identity: UserId,
        connection_id: ConnectionId,
        event: PresenceEvent,
    ) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        let message = SessionMessage::Presence {
            identity,
            connection_id,
            event,
            respond_to: tx,
        };
        if !self.send(message).await {
            return Err(self.not_found());
        }
        rx.await.unwrap_or_else(|_| Err(self.not_found()))
    }

    /// Snapshot of the session.
    pub async fn get_state(&self) -> Result<SessionState, ScError> {
        let (tx, rx) = oneshot::channel();
        if !self.send(SessionMessage::GetState { respond_to: tx }).await {
            return Err(self.not_found());
        }
        rx.await.map_err(|_| self.not_found())
    }

    /// Cancel the actor. It performs graceful shutdown before exiting.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn mailbox_depth(&self) -> usize {
        self.mailbox.current_depth()
    }

    async fn send(&self, message: SessionMessage) -> bool {
        if self.sender.send(message).await.is_ok() {
            self.mailbox.record_enqueue();
            true
        } else {
            false
        }
    }

    fn closed(&self) -> ScError {
        ScError::SessionClosed(self.session_id.to_string())
    }

    fn not_found(&self) -> ScError {
        ScError::SessionNotFound(self.session_id.to_string())
    }
}

/// A participant record plus the connection that currently owns it.
struct ParticipantRecord {
    info: ParticipantInfo,
    connection: ConnectionHandle,
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    session_id: SessionId,
    /// Distinguishes this actor from a later one for the same session id.
    generation: u64,
    directory: SessionDirectory,
    attendance: AttendanceDispatcher,
    metrics: Arc<ActorMetrics>,
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
    participants: HashMap<UserId, ParticipantRecord>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    closed: bool,
}

impl SessionActor {
    /// Spawn a session actor. The caller inserts the handle into `directory`.
    pub(crate) fn spawn(
        session_id: SessionId,
        generation: u64,
        directory: SessionDirectory,
        attendance: AttendanceDispatcher,
        metrics: Arc<ActorMetrics>,
        cancel_token: CancellationToken,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Session,
            session_id.to_string(),
        ));
        metrics.session_created();

        let now = Utc::now();
        let actor = Self {
            session_id: session_id.clone(),
            generation,
            directory,
            attendance,
            metrics,
            receiver,
            cancel_token: cancel_token.clone(),
            mailbox: Arc::clone(&mailbox),
            participants: HashMap::new(),
            created_at: now,
            last_activity_at: now,
            closed: false,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            cancel_token,
            session_id,
            mailbox,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "sc.actor.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            generation = self.generation,
            "SessionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sc.actor.session",
                        session_id = %self.session_id,
                        "SessionActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        debug!(target: "sc.actor.session", "SessionActor channel closed, exiting");
                        break;
                    };
                    self.handle_message(message).await;
                    self.mailbox.record_dequeue();
                    self.metrics.record_message_processed();
                    if self.closed {
                        break;
                    }
                }
            }
        }

        self.reject_pending();
        self.metrics.session_removed();

        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            messages_processed = self.mailbox.messages_processed(),
            "SessionActor stopped"
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        self.last_activity_at = Utc::now();
        match message {
            SessionMessage::Join {
                participant,
                connection,
                respond_to,
            } => {
                let result = self.handle_join(participant, connection);
                let _ = respond_to.send(Ok(result));
            }

            SessionMessage::Leave {
                identity,
                connection_id,
                respond_to,
            } => {
                let outcome = self.handle_leave(&identity, connection_id).await;
                let _ = respond_to.send(outcome);
            }

            SessionMessage::Relay {
                from,
                connection_id,
                target,
                kind,
                payload,
                respond_to,
            } => {
                let result = self.handle_relay(&from, connection_id, &target, kind, payload);
                let _ = respond_to.send(result);
            }

            SessionMessage::Presence {
                identity,
                connection_id,
                event,
                respond_to,
            } => {
                let result = self.handle_presence(&identity, connection_id, event);
                let _ = respond_to.send(result);
            }

            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }
        }
    }

    fn handle_join(&mut self, participant: NewParticipant, connection: ConnectionHandle) -> JoinResult {
        let info = ParticipantInfo {
            identity: participant.identity.clone(),
            display_name: participant.display_name,
            role: participant.role,
            media_state: MediaState::default(),
            joined_at: Utc::now(),
        };

        let previous = self.participants.remove(&participant.identity);
        let is_new = previous.is_none();
        let replaced = previous
            .map(|record| record.connection.connection_id())
            .filter(|id| *id != connection.connection_id());

        let others = self.sorted_participants();

        // The joiner sees the list before anyone learns about it.
        connection.deliver(ServerMessage::ParticipantsList {
            participants: others.clone(),
        });

        self.participants.insert(
            participant.identity.clone(),
            ParticipantRecord {
                info: info.clone(),
                connection,
            },
        );

        self.broadcast(
            &participant.identity,
            &ServerMessage::ParticipantJoined {
                participant: info.clone(),
            },
        );

        if is_new {
            self.metrics.participant_added();
            self.attendance.dispatch(AttendanceEvent::join(
                self.session_id.clone(),
                participant.identity.clone(),
            ));
        }

        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            identity = %participant.identity,
            role = info.role.as_str(),
            replaced = replaced.is_some(),
            participants = self.participants.len(),
            "Participant joined"
        );

        JoinResult {
            participant: info,
            others,
            replaced,
        }
    }

    async fn handle_leave(
        &mut self,
        identity: &UserId,
        connection_id: Option<ConnectionId>,
    ) -> LeaveOutcome {
        let Some(record) = self.participants.get(identity) else {
            return LeaveOutcome::NotPresent;
        };

        if let Some(connection_id) = connection_id {
            if record.connection.connection_id() != connection_id {
                debug!(
                    target: "sc.actor.session",
                    session_id = %self.session_id,
                    identity = %identity,
                    stale_connection = %connection_id,
                    "Ignoring leave from superseded connection"
                );
                return LeaveOutcome::Superseded;
            }
        }

        self.participants.remove(identity);
        self.metrics.participants_removed(1);
        self.broadcast(
            identity,
            &ServerMessage::ParticipantLeft {
                identity: identity.clone(),
            },
        );
        self.attendance.dispatch(AttendanceEvent::leave(
            self.session_id.clone(),
            identity.clone(),
        ));

        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            identity = %identity,
            participants = self.participants.len(),
            "Participant left"
        );

        if self.participants.is_empty() {
            self.remove_from_directory().await;
            self.closed = true;
            info!(
                target: "sc.actor.session",
                session_id = %self.session_id,
                "Session empty, closing"
            );
        }

        LeaveOutcome::Removed {
            session_closed: self.closed,
        }
    }

    /// Whether `connection_id` is the connection currently representing `identity`.
    fn is_active_sender(&self, identity: &UserId, connection_id: ConnectionId) -> bool {
        let active = self
            .participants
            .get(identity)
            .is_some_and(|record| record.connection.connection_id() == connection_id);
        if !active && self.participants.contains_key(identity) {
            debug!(
                target: "sc.actor.session",
                session_id = %self.session_id,
                identity = %identity,
                stale_connection = %connection_id,
                "Rejecting message from superseded connection"
            );
        }
        active
    }

    fn handle_relay(
        &self,
        from: &UserId,
        connection_id: ConnectionId,
        target: &UserId,
        kind: SignalKind,
        payload: Value,
    ) -> Result<(), ScError> {
        if !self.is_active_sender(from, connection_id) {
            prom::record_relay(kind.as_str(), "not_participant");
            return Err(ScError::NotParticipant(self.session_id.to_string()));
        }

        let Some(recipient) = self.participants.get(target) else {
            prom::record_relay(kind.as_str(), "target_not_found");
            return Err(ScError::TargetNotFound(target.to_string()));
        };

        let delivered = recipient.connection.deliver(kind.received(from.clone(), payload));
        prom::record_relay(kind.as_str(), if delivered { "delivered" } else { "dropped" });

        debug!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            from = %from,
            target_identity = %target,
            kind = kind.as_str(),
            delivered,
            "Relayed signaling payload"
        );

        Ok(())
    }

    fn handle_presence(
        &mut self,
        identity: &UserId,
        connection_id: ConnectionId,
        event: PresenceEvent,
    ) -> Result<(), ScError> {
        if !self.is_active_sender(identity, connection_id) {
            return Err(ScError::NotParticipant(self.session_id.to_string()));
        }
        let Some(record) = self.participants.get_mut(identity) else {
            return Err(ScError::NotParticipant(self.session_id.to_string()));
        };

        event.apply(&mut record.info.media_state);
        let message = event.to_message(&record.info);
        self.broadcast(identity, &message);

        debug!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            identity = %identity,
            event = event.as_str(),
            "Presence event published"
        );

        Ok(())
    }

    /// Deliver `message` to every participant except `origin`.
    fn broadcast(&self, origin: &UserId, message: &ServerMessage) {
        let mut recipients = 0;
        for (identity, record) in &self.participants {
            if identity == origin {
                continue;
            }
            record.connection.deliver(message.clone());
            recipients += 1;
        }
        prom::record_broadcast(recipients);
    }

    fn sorted_participants(&self) -> Vec<ParticipantInfo> {
        let mut participants: Vec<ParticipantInfo> = self
            .participants
            .values()
            .map(|record| record.info.clone())
            .collect();
        participants.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.identity.as_str().cmp(b.identity.as_str()))
        });
        participants
    }

    fn state(&self) -> SessionState {
        SessionState {
            session_id: self.session_id.clone(),
            participants: self.sorted_participants(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }

    async fn remove_from_directory(&self) {
        let mut sessions = self.directory.write().await;
        let owned = sessions
            .get(&self.session_id)
            .is_some_and(|managed| managed.generation == self.generation);
        if owned {
            sessions.remove(&self.session_id);
        }
    }

    /// Shutdown path: release every participant and record their departure.
    async fn graceful_shutdown(&mut self) {
        let count = self.participants.len();
        for identity in self.participants.keys() {
            self.attendance.dispatch(AttendanceEvent::leave(
                self.session_id.clone(),
                identity.clone(),
            ));
        }
        self.participants.clear();
        self.metrics.participants_removed(count);
        self.remove_from_directory().await;
        self.closed = true;

        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            participants = count,
            "SessionActor shut down"
        );
    }

    /// Answer every request still queued after the actor stopped.
    fn reject_pending(&mut self) {
        self.receiver.close();
        let mut rejected = 0usize;
        while let Ok(message) = self.receiver.try_recv() {
            self.mailbox.record_dequeue();
            rejected += 1;
            match message {
                SessionMessage::Join { respond_to, .. } => {
                    let _ = respond_to.send(Err(ScError::SessionClosed(self.session_id.to_string())));
                }
                SessionMessage::Leave { respond_to, .. } => {
                    let _ = respond_to.send(LeaveOutcome::NotPresent);
                }
                SessionMessage::Relay { respond_to, .. }
                | SessionMessage::Presence { respond_to, .. } => {
                    let _ =
                        respond_to.send(Err(ScError::SessionNotFound(self.session_id.to_string())));
                }
                SessionMessage::GetState { respond_to } => {
                    // Dropping the sender reports the session as gone.
                    drop(respond_to);
                }
            }
        }
        if rejected > 0 {
            warn!(
                target: "sc.actor.session",
                session_id = %self.session_id,
                rejected,
                "Rejected requests queued on a closed session"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::registry::ManagedSession;
    use crate::protocol::Role;
    use crate::services::attendance::{AttendanceKind, AttendanceRecorder};
    use crate::tasks::AttendanceDispatcherConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct CollectingRecorder {
        events: Mutex<Vec<AttendanceEvent>>,
    }

    impl CollectingRecorder {
        /// Wait until at least `count` events were recorded.
        async fn wait_for_events(&self, count: usize) -> Vec<AttendanceEvent> {
            let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
            loop {
                let events = self.events.lock().unwrap().clone();
                if events.len() >= count || tokio::time::Instant::now() >= deadline {
                    return events;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        }
    }

    #[async_trait]
    impl AttendanceRecorder for CollectingRecorder {
        async fn record(&self, event: &AttendanceEvent) -> Result<(), ScError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Fixture {
        handle: SessionActorHandle,
        task: JoinHandle<()>,
        directory: SessionDirectory,
        recorder: Arc<CollectingRecorder>,
        metrics: Arc<ActorMetrics>,
    }

    async fn fixture() -> Fixture {
        let recorder = Arc::new(CollectingRecorder::default());
        let (attendance, _worker) = AttendanceDispatcher::start(
            recorder.clone(),
            AttendanceDispatcherConfig::default(),
            CancellationToken::new(),
        );
        let directory: SessionDirectory = Arc::new(RwLock::new(HashMap::new()));
        let metrics = ActorMetrics::new();
        let session_id = SessionId::new("s1");
        let (handle, task) = SessionActor::spawn(
            session_id.clone(),
            1,
            Arc::clone(&directory),
            attendance,
            Arc::clone(&metrics),
            CancellationToken::new(),
        );
        directory.write().await.insert(
            session_id,
            ManagedSession::placeholder(handle.clone(), 1),
        );
        Fixture {
            handle,
            task,
            directory,
            recorder,
            metrics,
        }
    }

    fn connection(identity: &str) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
        ConnectionHandle::new(
            ConnectionId::new(),
            UserId::new(identity),
            32,
            CancellationToken::new(),
        )
    }

    fn participant(identity: &str) -> NewParticipant {
        NewParticipant {
            identity: UserId::new(identity),
            display_name: identity.to_uppercase(),
            role: Role::Attendee,
        }
    }

    #[tokio::test]
    async fn test_join_sends_list_then_announces() {
        let f = fixture().await;
        let (conn_a, mut rx_a) = connection("a");
        let (conn_b, mut rx_b) = connection("b");

        let result = f.handle.join(participant("a"), conn_a).await.unwrap();
        assert!(result.others.is_empty());
        assert_eq!(
            rx_a.recv().await.unwrap(),
            ServerMessage::ParticipantsList {
                participants: vec![]
            }
        );

        let result = f.handle.join(participant("b"), conn_b).await.unwrap();
        assert_eq!(result.others.len(), 1);
        assert_eq!(result.others[0].identity, UserId::new("a"));

        let list = rx_b.recv().await.unwrap();
        assert!(matches!(list, ServerMessage::ParticipantsList { ref participants } if participants.len() == 1));

        let joined = rx_a.recv().await.unwrap();
        assert!(matches!(
            joined,
            ServerMessage::ParticipantJoined { ref participant } if participant.identity == UserId::new("b")
        ));
        assert!(rx_b.try_recv().is_err(), "joiner gets no echo of itself");
        assert_eq!(f.metrics.participant_count(), 2);
    }

    #[tokio::test]
    async fn test_rejoin_replaces_record_without_second_attendance() {
        let f = fixture().await;
        let (first, _rx1) = connection("a");
        let (second, _rx2) = connection("a");
        let first_id = first.connection_id();

        f.handle.join(participant("a"), first).await.unwrap();
        let result = f.handle.join(participant("a"), second).await.unwrap();
        assert_eq!(result.replaced, Some(first_id));

        let state = f.handle.get_state().await.unwrap();
        assert_eq!(state.participants.len(), 1);
        assert_eq!(f.metrics.participant_count(), 1);

        // Stale connection cannot evict the replacement.
        let outcome = f.handle.leave(UserId::new("a"), Some(first_id)).await;
        assert_eq!(outcome, LeaveOutcome::Superseded);
        assert_eq!(f.handle.get_state().await.unwrap().participants.len(), 1);

        // The queue is FIFO, so b's join lands after anything the rejoin sent.
        let (conn_b, _rx_b) = connection("b");
        f.handle.join(participant("b"), conn_b).await.unwrap();
        let events = f.recorder.wait_for_events(2).await;
        let a_joins = events
            .iter()
            .filter(|e| e.identity == UserId::new("a") && e.kind == AttendanceKind::Join)
            .count();
        assert_eq!(a_joins, 1);
        assert!(events
            .iter()
            .any(|e| e.identity == UserId::new("b") && e.kind == AttendanceKind::Join));
    }

    #[tokio::test]
    async fn test_relay_reaches_only_target() {
        let f = fixture().await;
        let (conn_a, mut rx_a) = connection("a");
        let (conn_b, mut rx_b) = connection("b");
        let (conn_c, mut rx_c) = connection("c");
        let a_id = conn_a.connection_id();
        f.handle.join(participant("a"), conn_a).await.unwrap();
        f.handle.join(participant("b"), conn_b).await.unwrap();
        f.handle.join(participant("c"), conn_c).await.unwrap();
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}
        while rx_c.try_recv().is_ok() {}

        f.handle
            .relay(
                UserId::new("a"),
                a_id,
                UserId::new("b"),
                SignalKind::Offer,
                json!({"sdp": "x"}),
            )
            .await
            .unwrap();

        assert_eq!(
            rx_b.try_recv().unwrap(),
            ServerMessage::OfferReceived {
                from_identity: UserId::new("a"),
                payload: json!({"sdp": "x"})
            }
        );
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_errors() {
        let f = fixture().await;
        let (conn_a, _rx_a) = connection("a");
        let a_id = conn_a.connection_id();
        f.handle.join(participant("a"), conn_a).await.unwrap();

        let missing_target = f
            .handle
            .relay(
                UserId::new("a"),
                a_id,
                UserId::new("z"),
                SignalKind::Answer,
                json!({}),
            )
            .await;
        assert!(matches!(missing_target, Err(ScError::TargetNotFound(_))));

        let outsider = f
            .handle
            .relay(
                UserId::new("x"),
                ConnectionId::new(),
                UserId::new("a"),
                SignalKind::Answer,
                json!({}),
            )
            .await;
        assert!(matches!(outsider, Err(ScError::NotParticipant(_))));
    }

    #[tokio::test]
    async fn test_presence_updates_state_without_self_echo() {
        let f = fixture().await;
        let (conn_a, mut rx_a) = connection("a");
        let (conn_b, mut rx_b) = connection("b");
        let b_id = conn_b.connection_id();
        f.handle.join(participant("a"), conn_a).await.unwrap();
        f.handle.join(participant("b"), conn_b).await.unwrap();
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        f.handle
            .publish(UserId::new("b"), b_id, PresenceEvent::VideoToggled(false))
            .await
            .unwrap();

        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerMessage::VideoToggled {
                identity: UserId::new("b"),
                enabled: false
            }
        );
        assert!(rx_b.try_recv().is_err());

        let state = f.handle.get_state().await.unwrap();
        let b = state
            .participants
            .iter()
            .find(|p| p.identity == UserId::new("b"))
            .unwrap();
        assert!(!b.media_state.video_enabled);

        let outsider = f
            .handle
            .publish(UserId::new("x"), ConnectionId::new(), PresenceEvent::HandRaised)
            .await;
        assert!(matches!(outsider, Err(ScError::NotParticipant(_))));
    }

    #[tokio::test]
    async fn test_superseded_connection_cannot_act_for_identity() {
        let f = fixture().await;
        let (old_a, _rx_old) = connection("a");
        let (new_a, mut rx_new) = connection("a");
        let (conn_b, mut rx_b) = connection("b");
        let old_id = old_a.connection_id();
        let new_id = new_a.connection_id();
        f.handle.join(participant("a"), old_a).await.unwrap();
        f.handle.join(participant("b"), conn_b).await.unwrap();
        f.handle.join(participant("a"), new_a).await.unwrap();
        while rx_new.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        let toggle = f
            .handle
            .publish(UserId::new("a"), old_id, PresenceEvent::AudioToggled(false))
            .await;
        assert!(matches!(toggle, Err(ScError::NotParticipant(_))));

        let offer = f
            .handle
            .relay(
                UserId::new("a"),
                old_id,
                UserId::new("b"),
                SignalKind::Offer,
                json!({"sdp": "stale"}),
            )
            .await;
        assert!(matches!(offer, Err(ScError::NotParticipant(_))));
        assert!(rx_b.try_recv().is_err());

        let state = f.handle.get_state().await.unwrap();
        let a = state
            .participants
            .iter()
            .find(|p| p.identity == UserId::new("a"))
            .unwrap();
        assert!(a.media_state.audio_enabled);

        f.handle
            .publish(UserId::new("a"), new_id, PresenceEvent::AudioToggled(false))
            .await
            .unwrap();
        assert_eq!(
            rx_b.try_recv().unwrap(),
            ServerMessage::AudioToggled {
                identity: UserId::new("a"),
                enabled: false
            }
        );
    }

    #[tokio::test]
    async fn test_last_leave_closes_session() {
        let f = fixture().await;
        let (conn_a, _rx_a) = connection("a");
        let conn_id = conn_a.connection_id();
        f.handle.join(participant("a"), conn_a).await.unwrap();

        let outcome = f.handle.leave(UserId::new("a"), Some(conn_id)).await;
        assert_eq!(
            outcome,
            LeaveOutcome::Removed {
                session_closed: true
            }
        );

        f.task.await.unwrap();
        assert!(f.directory.read().await.is_empty());
        assert_eq!(f.metrics.session_count(), 0);
        assert_eq!(f.metrics.participant_count(), 0);

        let (late, _rx) = connection("b");
        let result = f.handle.join(participant("b"), late).await;
        assert!(matches!(result, Err(ScError::SessionClosed(_))));
        assert!(matches!(
            f.handle.get_state().await,
            Err(ScError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_releases_participants() {
        let f = fixture().await;
        let (conn_a, _rx_a) = connection("a");
        let (conn_b, _rx_b) = connection("b");
        f.handle.join(participant("a"), conn_a).await.unwrap();
        f.handle.join(participant("b"), conn_b).await.unwrap();

        f.handle.cancel();
        f.task.await.unwrap();

        assert!(f.handle.is_cancelled());
        assert!(f.directory.read().await.is_empty());
        assert_eq!(f.metrics.participant_count(), 0);
        assert_eq!(f.metrics.session_count(), 0);
    }
}
