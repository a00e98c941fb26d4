//! Donation feed WebSockets.
//!
//! Each upgraded socket is split into a reader loop and a writer task that
//! drain the connection's queue in the hub. Credentials are checked before
//! the upgrade so unauthenticated clients get a plain 401.

use axum::{
    body::Bytes,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use reveegate_core::auth::{AuthError, Identity, TokenValidator};
use reveegate_core::realtime::{
    ConnectionConfig, ConnectionReader, ConnectionWriter, InboundReply, open_connection,
};
use reveegate_sdk::objects::WsCloseCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{Instant, timeout};

use crate::api::extractors::bearer_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct TokenQuery {
    token: Option<String>,
}

/// `GET /ws/overlay?token=…`: overlay donation feed.
pub(super) async fn overlay_ws(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = query.token.unwrap_or_default();
    let validator = state.overlay_auth.clone();
    authorize_and_upgrade(ws, state, validator.as_ref(), &token, "overlay")
}

/// `GET /ws/admin`: admin feed; JWT from the `Authorization` header or
/// `?token=` for browsers that cannot set headers on a WebSocket.
pub(super) async fn admin_ws(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(query.token)
        .unwrap_or_default();
    let validator = state.admin_auth.clone();
    authorize_and_upgrade(ws, state, validator.as_ref(), &token, "admin")
}

fn authorize_and_upgrade(
    ws: WebSocketUpgrade,
    state: AppState,
    validator: &dyn TokenValidator,
    token: &str,
    kind: &'static str,
) -> Response {
    let identity = match validator.validate(token) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, kind, "WS: rejected credential");
            let message = match e {
                AuthError::Missing => "missing token",
                AuthError::Invalid => "invalid token",
                AuthError::Expired => "token expired",
            };
            return (StatusCode::UNAUTHORIZED, message).into_response();
        }
    };
    let max = state.connection.max_message_size;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| handle_feed_ws(socket, state, identity))
}

/// Drive a single feed connection until either side gives up.
async fn handle_feed_ws(mut socket: WebSocket, state: AppState, identity: Identity) {
    let config = state.connection;
    let (reader, writer) =
        match open_connection(&state.hub, identity.channel.clone(), &config).await {
            Ok(halves) => halves,
            Err(e) => {
                tracing::error!(error = %e, "WS: failed to register connection");
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: WsCloseCode::INTERNAL_ERROR,
                        reason: "internal error".into(),
                    })))
                    .await;
                return;
            }
        };

    let id = reader.id();
    let channel = reader.channel().to_string();
    tracing::info!(client_id = %id, %channel, subject = %identity.subject, "WS: client connected");

    let (sink, stream) = socket.split();
    let mut write_task = tokio::spawn(write_loop(sink, writer, config));
    let mut read_task = tokio::spawn(read_loop(stream, reader, config));

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => {}
    }

    if let Err(e) = state.hub.unregister(id, channel.clone()).await {
        tracing::debug!(error = %e, client_id = %id, "WS: hub gone before unregister");
    }

    // Unregistering closes the queue, so the writer sends a close frame and ends.
    if !write_task.is_finished() && timeout(config.write_wait, &mut write_task).await.is_err() {
        write_task.abort();
    }
    tracing::info!(client_id = %id, %channel, "WS: client disconnected");
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    reader: ConnectionReader,
    config: ConnectionConfig,
) {
    let deadline = tokio::time::sleep(config.pong_wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::debug!(client_id = %reader.id(), "WS: read deadline exceeded");
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if reader.handle_text(text.as_str()) == InboundReply::Error {
                        tracing::debug!(client_id = %reader.id(), "WS: malformed client message");
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    deadline.as_mut().reset(Instant::now() + config.pong_wait);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, client_id = %reader.id(), "WS: read error");
                    break;
                }
            }
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut writer: ConnectionWriter,
    config: ConnectionConfig,
) {
    let mut ping = tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);

    loop {
        tokio::select! {
            frame = writer.next_frame() => match frame {
                Some(frame) => {
                    if send_with_deadline(&mut sink, Message::Text(frame.into()), config.write_wait)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                None => {
                    let close = Message::Close(Some(CloseFrame {
                        code: WsCloseCode::GOING_AWAY,
                        reason: "closing".into(),
                    }));
                    let _ = send_with_deadline(&mut sink, close, config.write_wait).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if send_with_deadline(&mut sink, Message::Ping(Bytes::new()), config.write_wait)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
    tracing::debug!(client_id = %writer.id(), "WS: writer finished");
}

/// Send a frame, giving up after `wait`.
async fn send_with_deadline(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    wait: Duration,
) -> Result<(), ()> {
    match timeout(wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "WS: send failed");
            Err(())
        }
        Err(_) => {
            tracing::debug!("WS: write deadline exceeded");
            Err(())
        }
    }
}
