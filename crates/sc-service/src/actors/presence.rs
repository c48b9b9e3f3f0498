//! Presence and media events.
//!
//! A [`PresenceEvent`] overwrites one flag of the originator's
//! [`MediaState`] and produces the frame fanned out to the other
//! participants. Join and leave announcements are produced by the session
//! actor directly since they change membership rather than media state.

use crate::protocol::{MediaState, ParticipantInfo, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    AudioToggled(bool),
    VideoToggled(bool),
    ScreenShareStarted,
    ScreenShareStopped,
    HandRaised,
    HandLowered,
}

impl PresenceEvent {
    /// Overwrite the affected flag.
    pub fn apply(self, state: &mut MediaState) {
        match self {
            PresenceEvent::AudioToggled(enabled) => state.audio_enabled = enabled,
            PresenceEvent::VideoToggled(enabled) => state.video_enabled = enabled,
            PresenceEvent::ScreenShareStarted => state.screen_sharing = true,
            PresenceEvent::ScreenShareStopped => state.screen_sharing = false,
            PresenceEvent::HandRaised => state.hand_raised = true,
            PresenceEvent::HandLowered => state.hand_raised = false,
        }
    }

    /// Frame announcing this event about `origin`.
    #[must_use]
    pub fn to_message(self, origin: &ParticipantInfo) -> ServerMessage {
        let identity = origin.identity.clone();
        match self {
            PresenceEvent::AudioToggled(enabled) => ServerMessage::AudioToggled { identity, enabled },
            PresenceEvent::VideoToggled(enabled) => ServerMessage::VideoToggled { identity, enabled },
            PresenceEvent::ScreenShareStarted => ServerMessage::ScreenShareStarted { identity },
            PresenceEvent::ScreenShareStopped => ServerMessage::ScreenShareStopped { identity },
            PresenceEvent::HandRaised => ServerMessage::HandRaised {
                identity,
                display_name: origin.display_name.clone(),
            },
            PresenceEvent::HandLowered => ServerMessage::HandLowered { identity },
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceEvent::AudioToggled(_) => "audio-toggled",
            PresenceEvent::VideoToggled(_) => "video-toggled",
            PresenceEvent::ScreenShareStarted => "screen-share-started",
            PresenceEvent::ScreenShareStopped => "screen-share-stopped",
            PresenceEvent::HandRaised => "hand-raised",
            PresenceEvent::HandLowered => "hand-lowered",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::protocol::Role;
    use chrono::Utc;
    use common::types::UserId;

    fn origin() -> ParticipantInfo {
        ParticipantInfo {
            identity: UserId::new("bob"),
            display_name: "Bob".to_string(),
            role: Role::Attendee,
            media_state: MediaState::default(),
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_overwrites_flags() {
        let mut state = MediaState::default();

        PresenceEvent::VideoToggled(false).apply(&mut state);
        assert!(!state.video_enabled);
        PresenceEvent::VideoToggled(false).apply(&mut state);
        assert!(!state.video_enabled, "toggle is idempotent");
        PresenceEvent::VideoToggled(true).apply(&mut state);
        assert!(state.video_enabled);

        PresenceEvent::AudioToggled(false).apply(&mut state);
        assert!(!state.audio_enabled);

        PresenceEvent::ScreenShareStarted.apply(&mut state);
        assert!(state.screen_sharing);
        PresenceEvent::ScreenShareStopped.apply(&mut state);
        assert!(!state.screen_sharing);

        PresenceEvent::HandRaised.apply(&mut state);
        assert!(state.hand_raised);
        PresenceEvent::HandLowered.apply(&mut state);
        assert!(!state.hand_raised);
    }

    #[test]
    fn test_messages_name_the_originator() {
        let origin = origin();
        assert_eq!(
            PresenceEvent::AudioToggled(false).to_message(&origin),
            ServerMessage::AudioToggled {
                identity: UserId::new("bob"),
                enabled: false
            }
        );
        assert_eq!(
            PresenceEvent::HandRaised.to_message(&origin),
            ServerMessage::HandRaised {
                identity: UserId::new("bob"),
                display_name: "Bob".to_string()
            }
        );
        assert_eq!(
            PresenceEvent::ScreenShareStopped.to_message(&origin).kind(),
            PresenceEvent::ScreenShareStopped.as_str()
        );
    }
}
