//! Message types for actor communication.
//!
//! Request/response messages carry a `oneshot` sender for the reply.

use super::connection::ConnectionHandle;
use super::presence::PresenceEvent;
use crate::errors::ScError;
use crate::protocol::{ClientMessage, ParticipantInfo, Role, SignalKind};
use chrono::{DateTime, Utc};
use common::types::{ConnectionId, SessionId, UserId};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

/// Messages handled by a `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Insert or replace a participant.
    Join {
        participant: NewParticipant,
        connection: ConnectionHandle,
        respond_to: oneshot::Sender<Result<JoinResult, ScError>>,
    },

    /// Remove a participant.
    ///
    /// With `connection_id`, removal happens only if that connection is the
    /// one currently recorded for `identity`.
    Leave {
        identity: UserId,
        connection_id: Option<ConnectionId>,
        respond_to: oneshot::Sender<LeaveOutcome>,
    },

    /// Forward a negotiation payload to one participant.
    ///
    /// Rejected unless `connection_id` is the connection currently recorded
    /// for `from`.
    Relay {
        from: UserId,
        connection_id: ConnectionId,
        target: UserId,
        kind: SignalKind,
        payload: Value,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Apply a media/presence change and fan it out.
    Presence {
        identity: UserId,
        connection_id: ConnectionId,
        event: PresenceEvent,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Snapshot of the session.
    GetState {
        respond_to: oneshot::Sender<SessionState>,
    },
}

/// Messages handled by a `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Raw text frame read from the socket.
    Frame { text: String },

    /// Already-decoded inbound message.
    Client { message: ClientMessage },

    /// Reply once every earlier message has been processed.
    Flush { respond_to: oneshot::Sender<()> },

    /// The socket closed; clean up and stop.
    Close,
}

/// Participant data supplied by the joining connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipant {
    pub identity: UserId,
    pub display_name: String,
    pub role: Role,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinResult {
    /// The participant record as stored.
    pub participant: ParticipantInfo,
    /// Other participants at the time of the join.
    pub others: Vec<ParticipantInfo>,
    /// Connection whose record was replaced, if any.
    pub replaced: Option<ConnectionId>,
}

/// Result of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The participant was removed.
    Removed {
        /// The session became empty and no longer exists.
        session_closed: bool,
    },
    /// No participant record for the identity.
    NotPresent,
    /// The record belongs to a newer connection; nothing was removed.
    Superseded,
}

/// Snapshot of one session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: SessionId,
    pub participants: Vec<ParticipantInfo>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Registry status for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    pub session_count: usize,
    pub connection_count: usize,
    pub participant_count: usize,
    pub is_shutting_down: bool,
}
