//! Wire protocol for the signaling socket.
//!
//! Every frame is a JSON object tagged by `"type"` with a kebab-case kind and
//! camelCase fields. Inbound and outbound kinds are closed enums so every
//! kind is handled exhaustively by the connection actor.
//!
//! Negotiation payloads (`offer`, `answer`, `ice-candidate`) are carried as
//! opaque [`serde_json::Value`]s and forwarded verbatim.

use chrono::{DateTime, Utc};
use common::types::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a participant inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Presenter,
    Attendee,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Presenter => "presenter",
            Role::Attendee => "attendee",
        }
    }
}

/// Media flags of a participant.
///
/// Toggles overwrite the flag; they never accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_sharing: bool,
    pub hand_raised: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
            screen_sharing: false,
            hand_raised: false,
        }
    }
}

/// Participant as seen by other clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub identity: UserId,
    pub display_name: String,
    pub role: Role,
    pub media_state: MediaState,
    pub joined_at: DateTime<Utc>,
}

/// Error codes surfaced to clients in `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    SessionNotFound,
    TargetUserNotFound,
    ServerError,
    InvalidMessage,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::TargetUserNotFound => "TARGET_USER_NOT_FOUND",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
        }
    }
}

/// Kind of a point-to-point negotiation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }

    /// Build the frame delivered to the relay target.
    #[must_use]
    pub fn received(self, from_identity: UserId, payload: Value) -> ServerMessage {
        match self {
            SignalKind::Offer => ServerMessage::OfferReceived {
                from_identity,
                payload,
            },
            SignalKind::Answer => ServerMessage::AnswerReceived {
                from_identity,
                payload,
            },
            SignalKind::IceCandidate => ServerMessage::IceCandidateReceived {
                from_identity,
                payload,
            },
        }
    }
}

/// Client → coordinator frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinSession {
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
    },
    LeaveSession {
        session_id: SessionId,
    },
    Offer {
        session_id: SessionId,
        target_identity: UserId,
        payload: Value,
    },
    Answer {
        session_id: SessionId,
        target_identity: UserId,
        payload: Value,
    },
    IceCandidate {
        session_id: SessionId,
        target_identity: UserId,
        payload: Value,
    },
    ToggleAudio {
        session_id: SessionId,
        enabled: bool,
    },
    ToggleVideo {
        session_id: SessionId,
        enabled: bool,
    },
    ScreenShareStart {
        session_id: SessionId,
    },
    ScreenShareStop {
        session_id: SessionId,
    },
    RaiseHand {
        session_id: SessionId,
    },
    LowerHand {
        session_id: SessionId,
    },
}

impl ClientMessage {
    /// Session the frame addresses.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            ClientMessage::JoinSession { session_id, .. }
            | ClientMessage::LeaveSession { session_id }
            | ClientMessage::Offer { session_id, .. }
            | ClientMessage::Answer { session_id, .. }
            | ClientMessage::IceCandidate { session_id, .. }
            | ClientMessage::ToggleAudio { session_id, .. }
            | ClientMessage::ToggleVideo { session_id, .. }
            | ClientMessage::ScreenShareStart { session_id }
            | ClientMessage::ScreenShareStop { session_id }
            | ClientMessage::RaiseHand { session_id }
            | ClientMessage::LowerHand { session_id } => session_id,
        }
    }

    /// Bounded label used for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinSession { .. } => "join-session",
            ClientMessage::LeaveSession { .. } => "leave-session",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::ToggleAudio { .. } => "toggle-audio",
            ClientMessage::ToggleVideo { .. } => "toggle-video",
            ClientMessage::ScreenShareStart { .. } => "screen-share-start",
            ClientMessage::ScreenShareStop { .. } => "screen-share-stop",
            ClientMessage::RaiseHand { .. } => "raise-hand",
            ClientMessage::LowerHand { .. } => "lower-hand",
        }
    }
}

/// Coordinator → client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    ParticipantJoined {
        participant: ParticipantInfo,
    },
    ParticipantLeft {
        identity: UserId,
    },
    ParticipantsList {
        participants: Vec<ParticipantInfo>,
    },
    OfferReceived {
        from_identity: UserId,
        payload: Value,
    },
    AnswerReceived {
        from_identity: UserId,
        payload: Value,
    },
    IceCandidateReceived {
        from_identity: UserId,
        payload: Value,
    },
    AudioToggled {
        identity: UserId,
        enabled: bool,
    },
    VideoToggled {
        identity: UserId,
        enabled: bool,
    },
    ScreenShareStarted {
        identity: UserId,
    },
    ScreenShareStopped {
        identity: UserId,
    },
    HandRaised {
        identity: UserId,
        display_name: String,
    },
    HandLowered {
        identity: UserId,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    /// Build an `error` frame.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }

    /// Bounded label used for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::ParticipantJoined { .. } => "participant-joined",
            ServerMessage::ParticipantLeft { .. } => "participant-left",
            ServerMessage::ParticipantsList { .. } => "participants-list",
            ServerMessage::OfferReceived { .. } => "offer-received",
            ServerMessage::AnswerReceived { .. } => "answer-received",
            ServerMessage::IceCandidateReceived { .. } => "ice-candidate-received",
            ServerMessage::AudioToggled { .. } => "audio-toggled",
            ServerMessage::VideoToggled { .. } => "video-toggled",
            ServerMessage::ScreenShareStarted { .. } => "screen-share-started",
            ServerMessage::ScreenShareStopped { .. } => "screen-share-stopped",
            ServerMessage::HandRaised { .. } => "hand-raised",
            ServerMessage::HandLowered { .. } => "hand-lowered",
            ServerMessage::Error { .. } => "error",
        }
    }
}
