//! Scripted in-process client.
//!
//! A `TestClient` drives a real `ConnectionActor` exactly like the
//! WebSocket transport does, and exposes the connection's outbound queue
//! so tests can assert on every frame the coordinator sends.

use common::types::{ConnectionId, SessionId, UserId};
use sc_service::actors::{ConnectionActor, ConnectionActorHandle, ConnectionHandle, SessionRegistry};
use sc_service::auth::Principal;
use sc_service::protocol::{ClientMessage, ParticipantInfo, Role, ServerMessage};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long `recv` waits before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// An admitted client connection.
pub struct TestClient {
    principal: Principal,
    actor: ConnectionActorHandle,
    connection: ConnectionHandle,
    outbound: mpsc::Receiver<ServerMessage>,
    task: Option<JoinHandle<()>>,
}

impl TestClient {
    /// Admit `principal` and spawn its connection actor.
    pub fn connect(registry: &SessionRegistry, principal: Principal, buffer: usize) -> Self {
        let (connection, outbound) = ConnectionHandle::new(
            ConnectionId::new(),
            principal.identity.clone(),
            buffer,
            registry.child_token(),
        );
        let (actor, task) =
            ConnectionActor::spawn(principal.clone(), connection.clone(), registry.clone());
        Self {
            principal,
            actor,
            connection,
            outbound,
            task: Some(task),
        }
    }

    pub fn identity(&self) -> &UserId {
        &self.principal.identity
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.connection_id()
    }

    /// Submit a message and wait until the actor has processed it.
    pub async fn send(&self, message: ClientMessage) {
        self.actor.submit(message).await.expect("connection actor gone");
        self.actor.flush().await.expect("connection actor gone");
    }

    /// Submit a raw text frame and wait until it has been processed.
    pub async fn send_raw(&self, text: &str) {
        self.actor
            .submit_frame(text.to_string())
            .await
            .expect("connection actor gone");
        self.actor.flush().await.expect("connection actor gone");
    }

    pub async fn join(&self, session_id: &str) {
        self.send(ClientMessage::JoinSession {
            session_id: SessionId::new(session_id),
            display_name: None,
            role: None,
        })
        .await;
    }

    pub async fn join_as(&self, session_id: &str, display_name: &str, role: Role) {
        self.send(ClientMessage::JoinSession {
            session_id: SessionId::new(session_id),
            display_name: Some(display_name.to_string()),
            role: Some(role),
        })
        .await;
    }

    pub async fn leave(&self, session_id: &str) {
        self.send(ClientMessage::LeaveSession {
            session_id: SessionId::new(session_id),
        })
        .await;
    }

    pub async fn offer(&self, session_id: &str, target: &str, payload: Value) {
        self.send(ClientMessage::Offer {
            session_id: SessionId::new(session_id),
            target_identity: UserId::new(target),
            payload,
        })
        .await;
    }

    pub async fn answer(&self, session_id: &str, target: &str, payload: Value) {
        self.send(ClientMessage::Answer {
            session_id: SessionId::new(session_id),
            target_identity: UserId::new(target),
            payload,
        })
        .await;
    }

    pub async fn ice_candidate(&self, session_id: &str, target: &str, payload: Value) {
        self.send(ClientMessage::IceCandidate {
            session_id: SessionId::new(session_id),
            target_identity: UserId::new(target),
            payload,
        })
        .await;
    }

    pub async fn toggle_audio(&self, session_id: &str, enabled: bool) {
        self.send(ClientMessage::ToggleAudio {
            session_id: SessionId::new(session_id),
            enabled,
        })
        .await;
    }

    pub async fn toggle_video(&self, session_id: &str, enabled: bool) {
        self.send(ClientMessage::ToggleVideo {
            session_id: SessionId::new(session_id),
            enabled,
        })
        .await;
    }

    pub async fn raise_hand(&self, session_id: &str) {
        self.send(ClientMessage::RaiseHand {
            session_id: SessionId::new(session_id),
        })
        .await;
    }

    /// Next outbound frame; fails the test after [`RECV_TIMEOUT`].
    pub async fn recv(&mut self) -> ServerMessage {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .unwrap_or_else(|_| panic!("{} timed out waiting for a frame", self.principal.identity))
            .expect("outbound queue closed")
    }

    /// Next outbound frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.outbound.try_recv().ok()
    }

    /// Every queued frame.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Assert that nothing is queued.
    pub fn assert_silent(&mut self) {
        let frames = self.drain();
        assert!(
            frames.is_empty(),
            "{} expected no frames, got {frames:?}",
            self.principal.identity
        );
    }

    /// Receive the `participants-list` sent on join.
    pub async fn expect_participants_list(&mut self) -> Vec<ParticipantInfo> {
        match self.recv().await {
            ServerMessage::ParticipantsList { participants } => participants,
            other => panic!("expected participants-list, got {other:?}"),
        }
    }

    /// Receive an `error` frame and return its wire code.
    pub async fn expect_error(&mut self) -> sc_service::protocol::ErrorCode {
        match self.recv().await {
            ServerMessage::Error { code, .. } => code,
            other => panic!("expected error, got {other:?}"),
        }
    }

    /// Close gracefully, as when the socket closes.
    pub async fn disconnect(mut self) {
        self.actor.close().await;
        if let Some(task) = self.task.take() {
            task.await.expect("connection actor panicked");
        }
    }

    /// Stop the actor without draining its mailbox, as on an abrupt drop.
    pub async fn abort(mut self) {
        self.actor.cancel();
        if let Some(task) = self.task.take() {
            task.await.expect("connection actor panicked");
        }
    }

    /// Whether the coordinator has closed this connection.
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}
