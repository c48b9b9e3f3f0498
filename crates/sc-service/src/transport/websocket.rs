//! Signaling WebSocket handling.
//!
//! A connection goes through two phases:
//!
//! 1. **Admission** - the credential from the `Authorization` header or the
//!    `token` query parameter is verified. Nothing is read from the socket
//!    before this completes. Failure sends an `UNAUTHORIZED` error frame and
//!    a policy-violation close frame.
//! 2. **Active** - a reader loop feeds text frames to the `ConnectionActor`
//!    in arrival order while a writer task drains the outbound queue.

use super::AppState;
use crate::actors::{ActorType, ConnectionActor, ConnectionActorHandle, ConnectionHandle};
use crate::errors::ScError;
use crate::observability::metrics as prom;
use crate::protocol::{ErrorCode, ServerMessage};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use common::types::ConnectionId;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interval between keep-alive pings.
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

/// `GET /ws` upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Response {
    let token = bearer_token(&headers).or(query.token);
    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

/// Extract the token from an `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim().to_string())
    } else {
        None
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, token: Option<String>) {
    let principal = match state.admission.admit(token.as_deref()).await {
        Ok(principal) => principal,
        Err(e) => {
            reject(socket, &e).await;
            return;
        }
    };

    let connection_id = ConnectionId::new();
    let (connection, outbound) = ConnectionHandle::new(
        connection_id,
        principal.identity.clone(),
        state.connection_buffer,
        state.registry.child_token(),
    );

    info!(
        target: "sc.connection",
        connection_id = %connection_id,
        identity = %principal.identity,
        "WebSocket connection established"
    );

    let (actor, actor_task) =
        ConnectionActor::spawn(principal, connection.clone(), state.registry.clone());

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_outbound(
        sink,
        outbound,
        connection.cancel_token().clone(),
    ));

    let writer_finished = tokio::select! {
        () = read_inbound(stream, &actor, &connection) => false,
        _ = &mut writer => true,
    };

    actor.close().await;
    if let Err(join_error) = actor_task.await {
        if join_error.is_panic() {
            error!(
                target: "sc.connection",
                connection_id = %connection_id,
                error = ?join_error,
                "ConnectionActor panicked"
            );
            state.registry.metrics().record_panic(ActorType::Connection);
            state.registry.metrics().connection_closed();
        }
        state.registry.handle_disconnection(connection_id).await;
    }
    connection.close();

    if !writer_finished {
        if let Err(e) = writer.await {
            warn!(target: "sc.connection", connection_id = %connection_id, error = ?e, "Writer task failed");
        }
    }

    info!(
        target: "sc.connection",
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}

/// Send an error frame and a policy-violation close.
async fn reject(mut socket: WebSocket, err: &ScError) {
    prom::record_error(err.error_type_label());
    let frame = ServerMessage::error(err.error_code(), err.client_message());
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = socket.send(Message::Text(text)).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: Cow::from("unauthorized"),
        })))
        .await;
}

async fn read_inbound(
    mut stream: SplitStream<WebSocket>,
    actor: &ConnectionActorHandle,
    connection: &ConnectionHandle,
) {
    let cancel_token = connection.cancel_token().clone();
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if actor.submit_frame(text).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    prom::record_error("invalid_message");
                    connection.deliver(ServerMessage::error(
                        ErrorCode::InvalidMessage,
                        "Binary frames are not supported",
                    ));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(
                        target: "sc.connection",
                        connection_id = %connection.connection_id(),
                        error = %e,
                        "WebSocket read failed"
                    );
                    break;
                }
            }
        }
    }
}

async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
    cancel_token: CancellationToken,
) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            biased;

            msg = outbound.recv() => {
                let Some(message) = msg else {
                    break;
                };
                if !send_frame(&mut sink, &message).await {
                    return;
                }
            }

            () = cancel_token.cancelled() => break,

            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
            }
        }
    }

    // Frames queued before the close still go out.
    while let Ok(message) = outbound.try_recv() {
        if !send_frame(&mut sink, &message).await {
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}

/// Returns `false` once the socket can no longer be written.
async fn send_frame(sink: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => sink.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            error!(target: "sc.connection", kind = message.kind(), error = %e, "Failed to encode frame");
            true
        }
    }
}
