//! HTTP surfaces of the signaling coordinator.
//!
//! - [`signaling_router`] - `GET /ws`, the signaling WebSocket
//! - [`introspection_router`] - `GET /status` and
//!   `GET /sessions/:session_id/participants`, served next to the health
//!   endpoints

pub mod websocket;

use crate::actors::SessionRegistry;
use crate::auth::admission::Admission;
use crate::protocol::{ErrorCode, ServerMessage};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use common::types::SessionId;
use tower_http::trace::TraceLayer;

/// Shared state for the signaling router.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub admission: Admission,
    /// Outbound queue capacity per connection.
    pub connection_buffer: usize,
}

/// Build the signaling router (`GET /ws`).
pub fn signaling_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Build the introspection router.
pub fn introspection_router(registry: SessionRegistry) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/sessions/:session_id/participants", get(participants_handler))
        .with_state(registry)
}

async fn status_handler(State(registry): State<SessionRegistry>) -> Response {
    Json(registry.status().await).into_response()
}

async fn participants_handler(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = SessionId::new(session_id);
    match registry.get_participants(&session_id).await {
        Ok(participants) => Json(participants).into_response(),
        Err(e) => {
            let status = match e.error_code() {
                ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(ServerMessage::error(e.error_code(), e.client_message())),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::registry::test_support::test_registry;
    use crate::actors::{ConnectionHandle, NewParticipant};
    use crate::protocol::{ParticipantInfo, Role};
    use axum::body::Body;
    use axum::http::Request;
    use common::types::{ConnectionId, UserId};
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_participants_of_missing_session_is_404() {
        let app = introspection_router(test_registry());

        let request = Request::builder()
            .uri("/sessions/ghost/participants")
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app.oneshot(request).await.expect("Failed to execute request");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_participants_of_live_session() {
        let registry = test_registry();
        let (connection, _rx) = ConnectionHandle::new(
            ConnectionId::new(),
            UserId::new("alice"),
            8,
            registry.child_token(),
        );
        registry
            .join(
                &SessionId::new("bio-7"),
                NewParticipant {
                    identity: UserId::new("alice"),
                    display_name: "Alice".to_string(),
                    role: Role::Presenter,
                },
                &connection,
            )
            .await
            .unwrap();

        let app = introspection_router(registry);
        let request = Request::builder()
            .uri("/sessions/bio-7/participants")
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app.oneshot(request).await.expect("Failed to execute request");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let participants: Vec<ParticipantInfo> = serde_json::from_slice(&body).unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].display_name, "Alice");
        assert_eq!(participants[0].role, Role::Presenter);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = introspection_router(test_registry());
        let request = Request::builder()
            .uri("/status")
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app.oneshot(request).await.expect("Failed to execute request");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["sessionCount"], 0);
        assert_eq!(json["isShuttingDown"], false);
    }
}
