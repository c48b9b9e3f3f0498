//! `ConnectionActor` - per-WebSocket connection actor.
//!
//! Each `ConnectionActor`:
//! - Carries exactly one admitted [`Principal`] for its lifetime
//! - Processes inbound frames strictly in arrival order
//! - Demultiplexes them into registry operations (join, leave, relay, presence)
//! - Reports every failure as an `error` frame without affecting later frames
//!
//! Outbound frames never pass through this actor: session actors write
//! directly to the connection's bounded outbound queue via
//! [`ConnectionHandle::deliver`].
//!
//! # Lifecycle
//!
//! 1. Spawned after admission succeeds
//! 2. Runs until the socket closes or the registry shuts down
//! 3. On exit, disconnect cleanup runs and the outbound writer is stopped

use super::messages::{ConnectionMessage, NewParticipant};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::presence::PresenceEvent;
use super::registry::SessionRegistry;
use crate::auth::Principal;
use crate::errors::ScError;
use crate::observability::metrics as prom;
use crate::protocol::{ClientMessage, ServerMessage, SignalKind};
use common::types::{ConnectionId, SessionId, UserId};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Channel buffer size for the inbound mailbox.
const CONNECTION_CHANNEL_BUFFER: usize = 64;

/// Sending side of one connection's outbound queue.
///
/// Cloned into every session the connection joins. Delivery never waits:
/// a full or closed queue drops the frame.
#[derive(Clone)]
pub struct ConnectionHandle {
    connection_id: ConnectionId,
    identity: UserId,
    outbound: mpsc::Sender<ServerMessage>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("connection_id", &self.connection_id)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// Create a handle and the receiver the socket writer drains.
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        identity: UserId,
        buffer: usize,
        cancel_token: CancellationToken,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (outbound, receiver) = mpsc::channel(buffer.max(1));
        (
            Self {
                connection_id,
                identity,
                outbound,
                cancel_token,
            },
            receiver,
        )
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    #[must_use]
    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    /// Queue a frame for the client without waiting.
    ///
    /// Returns `false` if the frame was dropped.
    pub fn deliver(&self, message: ServerMessage) -> bool {
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(
                    target: "sc.connection",
                    connection_id = %self.connection_id,
                    identity = %self.identity,
                    kind = message.kind(),
                    "Outbound queue full, dropping frame"
                );
                prom::record_outbound_dropped("full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                debug!(
                    target: "sc.connection",
                    connection_id = %self.connection_id,
                    kind = message.kind(),
                    "Outbound queue closed, dropping frame"
                );
                prom::record_outbound_dropped("closed");
                false
            }
        }
    }

    /// Stop the socket writer.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled() || self.outbound.is_closed()
    }

    /// Token cancelled when the connection closes.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    connection: ConnectionHandle,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActorHandle {
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.connection_id()
    }

    #[must_use]
    pub fn identity(&self) -> &UserId {
        self.connection.identity()
    }

    /// Submit a raw text frame. Waits for mailbox capacity.
    pub async fn submit_frame(&self, text: String) -> Result<(), ScError> {
        self.send(ConnectionMessage::Frame { text }).await
    }

    /// Submit an already-decoded message. Waits for mailbox capacity.
    pub async fn submit(&self, message: ClientMessage) -> Result<(), ScError> {
        self.send(ConnectionMessage::Client { message }).await
    }

    /// Wait until every previously submitted message has been processed.
    pub async fn flush(&self) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.send(ConnectionMessage::Flush { respond_to: tx }).await?;
        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Ask the actor to clean up and stop after the queued messages.
    pub async fn close(&self) {
        let _ = self.send(ConnectionMessage::Close).await;
    }

    /// Stop the actor immediately.
    pub fn cancel(&self) {
        self.connection.close();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.connection.cancel_token().is_cancelled()
    }

    async fn send(&self, message: ConnectionMessage) -> Result<(), ScError> {
        self.mailbox.record_enqueue();
        self.sender
            .send(message)
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    principal: Principal,
    connection: ConnectionHandle,
    registry: SessionRegistry,
    receiver: mpsc::Receiver<ConnectionMessage>,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActor {
    /// Spawn the actor for an admitted connection.
    ///
    /// The connection handle's cancellation token doubles as the actor's
    /// token; it should be a child of the registry token.
    pub fn spawn(
        principal: Principal,
        connection: ConnectionHandle,
        registry: SessionRegistry,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_CHANNEL_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Connection,
            connection.connection_id().to_string(),
        ));
        let metrics = registry.metrics();
        metrics.connection_opened();

        let actor = Self {
            principal,
            connection: connection.clone(),
            registry,
            receiver,
            metrics,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            connection,
            mailbox,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "sc.actor.connection",
        fields(connection_id = %self.connection.connection_id(), identity = %self.principal.identity)
    )]
    async fn run(mut self) {
        debug!(target: "sc.actor.connection", "ConnectionActor started");

        let cancel_token = self.connection.cancel_token().clone();
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    debug!(
                        target: "sc.actor.connection",
                        "ConnectionActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        debug!(target: "sc.actor.connection", "ConnectionActor channel closed, exiting");
                        break;
                    };
                    let should_exit = self.handle_message(message).await;
                    self.mailbox.record_dequeue();
                    self.metrics.record_message_processed();
                    if should_exit {
                        break;
                    }
                }
            }
        }

        self.registry
            .handle_disconnection(self.connection.connection_id())
            .await;
        self.connection.close();
        self.metrics.connection_closed();

        info!(
            target: "sc.actor.connection",
            connection_id = %self.connection.connection_id(),
            identity = %self.principal.identity,
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionActor stopped"
        );
    }

    /// Returns `true` when the actor should stop.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::Frame { text } => {
                self.handle_frame(&text).await;
                false
            }
            ConnectionMessage::Client { message } => {
                self.handle_client_message(message).await;
                false
            }
            ConnectionMessage::Flush { respond_to } => {
                let _ = respond_to.send(());
                false
            }
            ConnectionMessage::Close => true,
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle_client_message(message).await,
            Err(e) => {
                self.report_error("invalid", None, &ScError::InvalidMessage(e.to_string()));
            }
        }
    }

    /// Process one inbound message; failures are reported to the client only.
    async fn handle_client_message(&mut self, message: ClientMessage) {
        let kind = message.kind();
        let session_id = message.session_id().clone();
        let start = Instant::now();

        if let Err(e) = self.dispatch(message).await {
            self.report_error(kind, Some(&session_id), &e);
        }

        prom::record_message(kind, start.elapsed());
    }

    async fn dispatch(&mut self, message: ClientMessage) -> Result<(), ScError> {
        let identity = self.principal.identity.clone();
        match message {
            ClientMessage::JoinSession {
                session_id,
                display_name,
                role,
            } => {
                let participant = NewParticipant {
                    identity,
                    display_name: self
                        .principal
                        .effective_display_name(display_name.as_deref()),
                    role: self.principal.effective_role(role),
                };
                self.registry
                    .join(&session_id, participant, &self.connection)
                    .await?;
                Ok(())
            }

            ClientMessage::LeaveSession { session_id } => {
                self.registry
                    .leave_connection(self.connection.connection_id(), &session_id)
                    .await;
                Ok(())
            }

            ClientMessage::Offer {
                session_id,
                target_identity,
                payload,
            } => {
                self.registry
                    .relay(
                        &session_id,
                        &self.connection,
                        &target_identity,
                        SignalKind::Offer,
                        payload,
                    )
                    .await
            }

            ClientMessage::Answer {
                session_id,
                target_identity,
                payload,
            } => {
                self.registry
                    .relay(
                        &session_id,
                        &self.connection,
                        &target_identity,
                        SignalKind::Answer,
                        payload,
                    )
                    .await
            }

            ClientMessage::IceCandidate {
                session_id,
                target_identity,
                payload,
            } => {
                self.registry
                    .relay(
                        &session_id,
                        &self.connection,
                        &target_identity,
                        SignalKind::IceCandidate,
                        payload,
                    )
                    .await
            }

            ClientMessage::ToggleAudio {
                session_id,
                enabled,
            } => {
                self.registry
                    .publish(&session_id, &self.connection, PresenceEvent::AudioToggled(enabled))
                    .await
            }

            ClientMessage::ToggleVideo {
                session_id,
                enabled,
            } => {
                self.registry
                    .publish(&session_id, &self.connection, PresenceEvent::VideoToggled(enabled))
                    .await
            }

            ClientMessage::ScreenShareStart { session_id } => {
                self.registry
                    .publish(&session_id, &self.connection, PresenceEvent::ScreenShareStarted)
                    .await
            }

            ClientMessage::ScreenShareStop { session_id } => {
                self.registry
                    .publish(&session_id, &self.connection, PresenceEvent::ScreenShareStopped)
                    .await
            }

            ClientMessage::RaiseHand { session_id } => {
                self.registry
                    .publish(&session_id, &self.connection, PresenceEvent::HandRaised)
                    .await
            }

            ClientMessage::LowerHand { session_id } => {
                self.registry
                    .publish(&session_id, &self.connection, PresenceEvent::HandLowered)
                    .await
            }
        }
    }

    fn report_error(&self, kind: &'static str, session_id: Option<&SessionId>, err: &ScError) {
        let session_id = session_id.map(SessionId::as_str);
        if err.is_expected() {
            debug!(
                target: "sc.actor.connection",
                connection_id = %self.connection.connection_id(),
                session_id,
                message_type = kind,
                error = %err,
                "Message rejected"
            );
        } else {
            error!(
                target: "sc.actor.connection",
                connection_id = %self.connection.connection_id(),
                identity = %self.principal.identity,
                session_id,
                message_type = kind,
                error = %err,
                "Message processing failed"
            );
        }
        prom::record_error(err.error_type_label());
        self.connection
            .deliver(ServerMessage::error(err.error_code(), err.client_message()));
    }
}
