//! Signaling Coordinator error types.
//!
//! Error types map to wire [`ErrorCode`] values for client responses.
//! Internal details are logged server-side but not exposed to clients.

use crate::protocol::ErrorCode;
use thiserror::Error;

/// Signaling Coordinator error type.
///
/// Maps to wire `ErrorCode` values:
/// - `Authentication`, `AccessDenied`, `NotParticipant`: `UNAUTHORIZED`
/// - `SessionNotFound`: `SESSION_NOT_FOUND`
/// - `TargetNotFound`: `TARGET_USER_NOT_FOUND`
/// - `InvalidMessage`: `INVALID_MESSAGE`
/// - everything else: `SERVER_ERROR`
#[derive(Debug, Error)]
pub enum ScError {
    /// Credential missing, malformed, expired or rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The access-check collaborator denied the session.
    #[error("Access denied to session {0}")]
    AccessDenied(String),

    /// Sender is not a participant of the addressed session.
    #[error("Not a participant of session {0}")]
    NotParticipant(String),

    /// Session does not exist in the registry.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Relay target has no participant record in the session.
    #[error("Target participant not found: {0}")]
    TargetNotFound(String),

    /// The access-check collaborator failed or returned an unexpected answer.
    #[error("Access check failed: {0}")]
    AccessCheck(String),

    /// Attendance recording failed.
    #[error("Attendance recording failed: {0}")]
    Attendance(String),

    /// Inbound frame could not be parsed.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Session actor closed while the request was queued. Retried internally.
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Coordinator is shutting down.
    #[error("Coordinator is shutting down")]
    ShuttingDown,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Returns the wire `ErrorCode` for this error.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ScError::Authentication(_) | ScError::AccessDenied(_) | ScError::NotParticipant(_) => {
                ErrorCode::Unauthorized
            }
            ScError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            ScError::TargetNotFound(_) => ErrorCode::TargetUserNotFound,
            ScError::InvalidMessage(_) => ErrorCode::InvalidMessage,
            ScError::AccessCheck(_)
            | ScError::Attendance(_)
            | ScError::SessionClosed(_)
            | ScError::Config(_)
            | ScError::ShuttingDown
            | ScError::Internal(_) => ErrorCode::ServerError,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            ScError::Authentication(_) => "Invalid or expired credential".to_string(),
            ScError::AccessDenied(_) => "Access to this session is denied".to_string(),
            ScError::NotParticipant(_) => "You have not joined this session".to_string(),
            ScError::SessionNotFound(_) => "Session not found".to_string(),
            ScError::TargetNotFound(_) => "Target user is not in the session".to_string(),
            ScError::InvalidMessage(_) => "Message could not be parsed".to_string(),
            ScError::ShuttingDown => "Server is shutting down, please reconnect".to_string(),
            ScError::AccessCheck(_)
            | ScError::Attendance(_)
            | ScError::SessionClosed(_)
            | ScError::Config(_)
            | ScError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Returns a bounded label for the `sc_errors_total` metric.
    #[must_use]
    pub fn error_type_label(&self) -> &'static str {
        match self {
            ScError::Authentication(_) => "authentication",
            ScError::AccessDenied(_) => "access_denied",
            ScError::NotParticipant(_) => "not_participant",
            ScError::SessionNotFound(_) => "session_not_found",
            ScError::TargetNotFound(_) => "target_not_found",
            ScError::AccessCheck(_) => "access_check",
            ScError::Attendance(_) => "attendance",
            ScError::InvalidMessage(_) => "invalid_message",
            ScError::SessionClosed(_) => "session_closed",
            ScError::Config(_) => "config",
            ScError::ShuttingDown => "shutting_down",
            ScError::Internal(_) => "internal",
        }
    }

    /// Whether this error is an expected client-side race or mistake.
    ///
    /// Expected errors are logged at debug level, the rest at error level.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ScError::AccessDenied(_)
                | ScError::NotParticipant(_)
                | ScError::SessionNotFound(_)
                | ScError::TargetNotFound(_)
                | ScError::InvalidMessage(_)
                | ScError::ShuttingDown
        )
    }
}
