//! Session behavior through the registry and real connection actors.
//!
//! Each test drives `TestClient`s (in-process connections) against a
//! registry wired to mock collaborators, then asserts on the exact frames
//! every client received.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use common::types::{SessionId, UserId};
use sc_service::errors::ScError;
use sc_service::protocol::{ErrorCode, Role, ServerMessage};
use sc_service::services::attendance::AttendanceKind;
use sc_test_utils::{MockAccessChecker, RecordingAttendanceRecorder, TestHarness};
use serde_json::json;

const S1: &str = "S1";

// ============================================================================
// End-to-end scenario
// ============================================================================

#[tokio::test]
async fn test_classroom_scenario() {
    let harness = TestHarness::new();
    let mut a = harness.presenter("A");
    let mut b = harness.client("B");

    a.join(S1).await;
    assert!(a.expect_participants_list().await.is_empty());

    b.join(S1).await;
    let list = b.expect_participants_list().await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].identity, UserId::new("A"));
    assert_eq!(list[0].role, Role::Presenter);
    assert!(matches!(
        a.recv().await,
        ServerMessage::ParticipantJoined { ref participant }
            if participant.identity == UserId::new("B") && participant.role == Role::Attendee
    ));

    a.offer(S1, "B", json!({"sdp": "X"})).await;
    assert_eq!(
        b.recv().await,
        ServerMessage::OfferReceived {
            from_identity: UserId::new("A"),
            payload: json!({"sdp": "X"})
        }
    );
    a.assert_silent();

    b.toggle_video(S1, false).await;
    assert_eq!(
        a.recv().await,
        ServerMessage::VideoToggled {
            identity: UserId::new("B"),
            enabled: false
        }
    );
    b.assert_silent();
    let participants = harness
        .registry
        .get_participants(&SessionId::new(S1))
        .await
        .unwrap();
    let b_info = participants
        .iter()
        .find(|p| p.identity == UserId::new("B"))
        .unwrap();
    assert!(!b_info.media_state.video_enabled);

    // Ungraceful drop
    b.abort().await;
    assert_eq!(
        a.recv().await,
        ServerMessage::ParticipantLeft {
            identity: UserId::new("B")
        }
    );

    a.offer(S1, "B", json!({"sdp": "Y"})).await;
    assert_eq!(a.expect_error().await, ErrorCode::TargetUserNotFound);

    a.leave(S1).await;
    assert!(matches!(
        harness.registry.get_session_state(&SessionId::new(S1)).await,
        Err(ScError::SessionNotFound(_))
    ));
    assert_eq!(harness.registry.status().await.session_count, 0);

    let events = harness
        .attendance
        .wait_for_events(4, Duration::from_secs(2))
        .await;
    let kinds: Vec<(String, AttendanceKind)> = events
        .iter()
        .map(|e| (e.identity.to_string(), e.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("A".to_string(), AttendanceKind::Join),
            ("B".to_string(), AttendanceKind::Join),
            ("B".to_string(), AttendanceKind::Leave),
            ("A".to_string(), AttendanceKind::Leave),
        ]
    );
}

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_single_active_connection_per_identity() {
    let harness = TestHarness::new();
    let mut observer = harness.client("observer");
    let mut first = harness.client("dup");
    let mut second = harness.client("dup");

    observer.join(S1).await;
    observer.drain();

    first.join(S1).await;
    first.drain();
    second.join(S1).await;

    let list = second.expect_participants_list().await;
    assert_eq!(list.len(), 1, "the replaced record is not listed");
    assert_eq!(list[0].identity, UserId::new("observer"));

    let participants = harness
        .registry
        .get_participants(&SessionId::new(S1))
        .await
        .unwrap();
    assert_eq!(participants.len(), 2);

    // The replacement is announced again.
    let announcements = observer.drain();
    assert_eq!(announcements.len(), 2);
    assert!(announcements
        .iter()
        .all(|m| matches!(m, ServerMessage::ParticipantJoined { .. })));

    // Attendance is recorded once per identity.
    let events = harness
        .attendance
        .wait_for_events(2, Duration::from_secs(2))
        .await;
    let dup_joins = events
        .iter()
        .filter(|e| e.identity == UserId::new("dup") && e.kind == AttendanceKind::Join)
        .count();
    assert_eq!(dup_joins, 1);
}

#[tokio::test]
async fn test_stale_connection_cannot_evict_replacement() {
    let harness = TestHarness::new();
    let mut observer = harness.client("observer");
    let old = harness.client("dup");
    let mut new = harness.client("dup");

    observer.join(S1).await;
    old.join(S1).await;
    new.join(S1).await;
    observer.drain();
    new.drain();

    // Explicit leave from the replaced connection is ignored.
    old.leave(S1).await;
    // And so is its disconnect.
    old.disconnect().await;

    observer.assert_silent();
    let participants = harness
        .registry
        .get_participants(&SessionId::new(S1))
        .await
        .unwrap();
    assert!(participants.iter().any(|p| p.identity == UserId::new("dup")));

    // The live connection still works.
    new.raise_hand(S1).await;
    assert!(matches!(
        observer.recv().await,
        ServerMessage::HandRaised { ref identity, .. } if *identity == UserId::new("dup")
    ));
}

#[tokio::test]
async fn test_replaced_connection_cannot_act_as_participant() {
    let harness = TestHarness::new();
    let mut b = harness.client("B");
    let mut old = harness.client("A");
    let mut new = harness.client("A");

    b.join(S1).await;
    old.join(S1).await;
    new.join(S1).await;
    b.drain();
    old.drain();
    new.drain();

    old.toggle_audio(S1, false).await;
    assert_eq!(old.expect_error().await, ErrorCode::Unauthorized);
    old.raise_hand(S1).await;
    assert_eq!(old.expect_error().await, ErrorCode::Unauthorized);
    old.offer(S1, "B", json!({"sdp": "stale"})).await;
    assert_eq!(old.expect_error().await, ErrorCode::Unauthorized);
    b.assert_silent();
    new.assert_silent();

    let participants = harness
        .registry
        .get_participants(&SessionId::new(S1))
        .await
        .unwrap();
    let a = participants
        .iter()
        .find(|p| p.identity == UserId::new("A"))
        .unwrap();
    assert!(a.media_state.audio_enabled);
    assert!(!a.media_state.hand_raised);

    // The replacement still speaks for A.
    new.toggle_audio(S1, false).await;
    assert_eq!(
        b.recv().await,
        ServerMessage::AudioToggled {
            identity: UserId::new("A"),
            enabled: false
        }
    );
}

#[tokio::test]
async fn test_disconnect_cleanup_is_idempotent() {
    let harness = TestHarness::new();
    let mut a = harness.client("A");
    let b = harness.client("B");

    a.join(S1).await;
    b.join(S1).await;
    a.drain();

    let connection_id = b.connection_id();
    b.disconnect().await;
    harness.registry.handle_disconnection(connection_id).await;
    harness.registry.handle_disconnection(connection_id).await;

    let frames = a.drain();
    assert_eq!(
        frames,
        vec![ServerMessage::ParticipantLeft {
            identity: UserId::new("B")
        }]
    );
    assert_eq!(harness.metrics.participant_count(), 1);
}

#[tokio::test]
async fn test_session_exists_only_while_occupied() {
    let harness = TestHarness::new();
    let a = harness.client("A");
    let b = harness.client("B");

    a.join(S1).await;
    b.join(S1).await;
    assert_eq!(harness.registry.status().await.session_count, 1);

    a.leave(S1).await;
    assert_eq!(harness.registry.status().await.session_count, 1);

    b.disconnect().await;
    let status = harness.registry.status().await;
    assert_eq!(status.session_count, 0);
    assert_eq!(status.participant_count, 0);
}

#[tokio::test]
async fn test_leave_of_unjoined_session_is_noop() {
    let harness = TestHarness::new();
    let mut a = harness.client("A");
    a.leave("never-joined").await;
    a.assert_silent();
}

#[tokio::test]
async fn test_joining_second_session_leaves_first() {
    let harness = TestHarness::new();
    let mut observer = harness.client("observer");
    let a = harness.client("A");

    observer.join("S1").await;
    a.join("S1").await;
    observer.drain();

    a.join("S2").await;

    assert_eq!(
        observer.drain(),
        vec![ServerMessage::ParticipantLeft {
            identity: UserId::new("A")
        }]
    );
    let s2 = harness
        .registry
        .get_participants(&SessionId::new("S2"))
        .await
        .unwrap();
    assert_eq!(s2.len(), 1);
}

#[tokio::test]
async fn test_join_races_with_session_closure() {
    let harness = TestHarness::new();

    for round in 0..25 {
        let session = format!("race-{round}");
        let leaver = harness.client("leaver");
        let mut joiner = harness.client("joiner");

        leaver.join(&session).await;

        tokio::join!(leaver.leave(&session), joiner.join(&session));

        let frames = joiner.drain();
        assert!(
            frames
                .iter()
                .all(|m| !matches!(m, ServerMessage::Error { .. })),
            "join must not fail when racing with closure: {frames:?}"
        );
        let participants = harness
            .registry
            .get_participants(&SessionId::new(&session))
            .await
            .unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].identity, UserId::new("joiner"));

        joiner.disconnect().await;
        leaver.disconnect().await;
    }

    assert_eq!(harness.registry.status().await.session_count, 0);
}

#[tokio::test]
async fn test_concurrent_joins_all_land() {
    let harness = TestHarness::new();
    let clients: Vec<_> = (0..20)
        .map(|i| harness.client(&format!("student-{i}")))
        .collect();

    futures::future::join_all(clients.iter().map(|c| c.join(S1))).await;

    let participants = harness
        .registry
        .get_participants(&SessionId::new(S1))
        .await
        .unwrap();
    assert_eq!(participants.len(), 20);
    assert_eq!(harness.metrics.participant_count(), 20);
}

#[tokio::test]
async fn test_concurrent_leaves_both_broadcast() {
    let harness = TestHarness::new();
    let mut observer = harness.client("observer");
    let a = harness.client("A");
    let b = harness.client("B");

    observer.join(S1).await;
    a.join(S1).await;
    b.join(S1).await;
    observer.drain();

    tokio::join!(a.leave(S1), b.leave(S1));

    let frames = observer.drain();
    assert_eq!(frames.len(), 2, "exactly one departure per leave: {frames:?}");
    let mut departed: Vec<UserId> = frames
        .into_iter()
        .filter_map(|frame| match frame {
            ServerMessage::ParticipantLeft { identity } => Some(identity),
            _ => None,
        })
        .collect();
    departed.sort();
    assert_eq!(departed, vec![UserId::new("A"), UserId::new("B")]);

    let participants = harness
        .registry
        .get_participants(&SessionId::new(S1))
        .await
        .unwrap();
    assert_eq!(participants.len(), 1);
    assert_eq!(harness.metrics.participant_count(), 1);
}

// ============================================================================
// Relay
// ============================================================================

#[tokio::test]
async fn test_relay_reaches_exactly_one_target() {
    let harness = TestHarness::new();
    let mut clients: Vec<_> = (0..10)
        .map(|i| harness.client(&format!("p{i}")))
        .collect();
    for client in &clients {
        client.join(S1).await;
    }
    for client in &mut clients {
        client.drain();
    }

    clients[0]
        .ice_candidate(S1, "p7", json!({"candidate": "c1"}))
        .await;

    for (i, client) in clients.iter_mut().enumerate() {
        let frames = client.drain();
        if i == 7 {
            assert_eq!(
                frames,
                vec![ServerMessage::IceCandidateReceived {
                    from_identity: UserId::new("p0"),
                    payload: json!({"candidate": "c1"})
                }]
            );
        } else {
            assert!(frames.is_empty(), "p{i} received {frames:?}");
        }
    }
}

#[tokio::test]
async fn test_answer_is_relayed_back() {
    let harness = TestHarness::new();
    let mut a = harness.presenter("A");
    let mut b = harness.client("B");
    a.join(S1).await;
    b.join(S1).await;
    a.drain();
    b.drain();

    b.answer(S1, "A", json!({"sdp": "answer"})).await;
    assert_eq!(
        a.recv().await,
        ServerMessage::AnswerReceived {
            from_identity: UserId::new("B"),
            payload: json!({"sdp": "answer"})
        }
    );
}

#[tokio::test]
async fn test_relay_from_non_member_is_unauthorized() {
    let harness = TestHarness::new();
    let a = harness.client("A");
    let mut outsider = harness.client("outsider");
    a.join(S1).await;

    outsider.offer(S1, "A", json!({})).await;
    assert_eq!(outsider.expect_error().await, ErrorCode::Unauthorized);

    outsider.toggle_audio(S1, false).await;
    assert_eq!(outsider.expect_error().await, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn test_relay_to_missing_session() {
    let harness = TestHarness::new();
    let mut a = harness.client("A");
    a.offer("ghost", "B", json!({})).await;
    assert_eq!(a.expect_error().await, ErrorCode::SessionNotFound);
}

// ============================================================================
// Presence
// ============================================================================

#[tokio::test]
async fn test_no_self_echo_and_per_sender_order() {
    let harness = TestHarness::new();
    let mut a = harness.client("A");
    let mut b = harness.client("B");
    a.join(S1).await;
    b.join(S1).await;
    a.drain();
    b.drain();

    b.toggle_audio(S1, false).await;
    b.toggle_audio(S1, true).await;
    b.toggle_audio(S1, false).await;
    b.raise_hand(S1).await;

    b.assert_silent();
    assert_eq!(
        a.drain(),
        vec![
            ServerMessage::AudioToggled {
                identity: UserId::new("B"),
                enabled: false
            },
            ServerMessage::AudioToggled {
                identity: UserId::new("B"),
                enabled: true
            },
            ServerMessage::AudioToggled {
                identity: UserId::new("B"),
                enabled: false
            },
            ServerMessage::HandRaised {
                identity: UserId::new("B"),
                display_name: "B".to_string()
            },
        ]
    );

    let participants = harness
        .registry
        .get_participants(&SessionId::new(S1))
        .await
        .unwrap();
    let b_info = participants
        .iter()
        .find(|p| p.identity == UserId::new("B"))
        .unwrap();
    assert!(!b_info.media_state.audio_enabled);
    assert!(b_info.media_state.hand_raised);
}

#[tokio::test]
async fn test_join_role_and_display_name_policy() {
    let harness = TestHarness::new();
    let mut observer = harness.client("observer");
    let student = harness.client("student");
    let teacher = harness.presenter("teacher");
    observer.join(S1).await;
    observer.drain();

    student.join_as(S1, "  Sneaky  ", Role::Presenter).await;
    teacher.join_as(S1, "Ms. Frizzle", Role::Attendee).await;

    let participants = harness
        .registry
        .get_participants(&SessionId::new(S1))
        .await
        .unwrap();
    let student_info = participants
        .iter()
        .find(|p| p.identity == UserId::new("student"))
        .unwrap();
    assert_eq!(student_info.role, Role::Attendee);
    assert_eq!(student_info.display_name, "Sneaky");

    let teacher_info = participants
        .iter()
        .find(|p| p.identity == UserId::new("teacher"))
        .unwrap();
    assert_eq!(teacher_info.role, Role::Attendee, "presenters may join as attendee");
}

// ============================================================================
// Errors and collaborators
// ============================================================================

#[tokio::test]
async fn test_access_denied_join() {
    let harness = TestHarness::with_access(MockAccessChecker::allowing().deny_session("locked"));
    let mut a = harness.client("A");

    a.join("locked").await;
    assert_eq!(a.expect_error().await, ErrorCode::Unauthorized);
    assert_eq!(harness.registry.status().await.session_count, 0);

    a.join("open").await;
    assert!(a.expect_participants_list().await.is_empty());
    assert_eq!(harness.access.calls(), 2);
}

#[tokio::test]
async fn test_access_check_failure_is_server_error() {
    let harness = TestHarness::with_access(MockAccessChecker::failing());
    let mut a = harness.client("A");
    a.join(S1).await;
    assert_eq!(a.expect_error().await, ErrorCode::ServerError);
}

#[tokio::test]
async fn test_attendance_failure_does_not_block_join() {
    let harness = TestHarness::with_collaborators(
        MockAccessChecker::allowing(),
        RecordingAttendanceRecorder::always_failing(),
    );
    let mut a = harness.client("A");
    a.join(S1).await;
    assert!(a.expect_participants_list().await.is_empty());
}

#[tokio::test]
async fn test_attendance_retried_after_transient_failure() {
    let harness = TestHarness::with_collaborators(
        MockAccessChecker::allowing(),
        RecordingAttendanceRecorder::failing_first(1),
    );
    let a = harness.client("A");
    a.join(S1).await;

    let events = harness
        .attendance
        .wait_for_events(1, Duration::from_secs(2))
        .await;
    assert_eq!(events.len(), 1);
    assert_eq!(harness.attendance.attempts(), 2);
}

#[tokio::test]
async fn test_invalid_frame_does_not_affect_next_message() {
    let harness = TestHarness::new();
    let mut a = harness.client("A");

    a.send_raw("not json at all").await;
    assert_eq!(a.expect_error().await, ErrorCode::InvalidMessage);
    a.send_raw(r#"{"type":"dance","sessionId":"S1"}"#).await;
    assert_eq!(a.expect_error().await, ErrorCode::InvalidMessage);

    a.send_raw(r#"{"type":"join-session","sessionId":"S1","displayName":"Ann"}"#)
        .await;
    let list = a.expect_participants_list().await;
    assert!(list.is_empty());
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_connections_and_records_leaves() {
    let harness = TestHarness::new();
    let a = harness.client("A");
    let b = harness.client("B");
    a.join("S1").await;
    b.join("S2").await;

    let attendance = harness.attendance.clone();
    harness.registry.shutdown(Duration::from_secs(5)).await;
    assert!(a.is_closed());
    assert!(b.is_closed());

    let events = attendance.wait_for_events(4, Duration::from_secs(2)).await;
    let leaves = events
        .iter()
        .filter(|e| e.kind == AttendanceKind::Leave)
        .count();
    assert_eq!(leaves, 2);

    harness.shutdown().await;
}
