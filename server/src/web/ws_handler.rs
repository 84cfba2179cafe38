use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::engine::broker::RoomBroker;
use crate::engine::error::{BrokerError, ErrorCode};
use crate::engine::events::{ClientEvent, ServerEvent, SessionId};

use super::app_state::AppState;

/// Handshake parameters. Both are required; the upgrade is refused with
/// 400 before any WebSocket traffic when either is missing or empty.
#[derive(Deserialize)]
pub struct HandshakeParams {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    username: Option<String>,
}

/// `GET /ws?userId=<identity>&username=<displayName>`
pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HandshakeParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = params.user_id.unwrap_or_default();
    let username = params.username.unwrap_or_default();
    if user_id.trim().is_empty() || username.trim().is_empty() {
        debug!("handshake rejected: missing userId or username");
        return (StatusCode::BAD_REQUEST, "missing userId or username").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, username))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: String, username: String) {
    let (session_id, mut outbound) = match state.broker.connect(user_id.clone(), username) {
        Ok(admitted) => admitted,
        Err(err) => {
            // Validation failures past the emptiness check (oversized
            // fields) reject with a policy-violation close frame.
            let mut socket = socket;
            let _ = socket
                .send(WsMessage::Close(Some(CloseFrame {
                    code: 1008,
                    reason: err.to_string().into(),
                })))
                .await;
            return;
        }
    };

    info!(%session_id, %user_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();

    // Write loop: drain the broker's outbound queue onto the socket.
    let write_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize outbound event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Read loop: each inbound frame runs to completion against the broker
    // before the next is read, which gives per-source FIFO ordering.
    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            WsMessage::Text(text) => dispatch(&state.broker, session_id, &text),
            WsMessage::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    write_task.abort();
    state.broker.disconnect(session_id);
    info!(%session_id, %user_id, "websocket disconnected");
}

/// Decode one frame into the closed event set and apply it. Failures —
/// malformed frames and broker rejections alike — go back to the
/// originating session only, as a typed `error` event.
pub(crate) fn dispatch(broker: &RoomBroker, session_id: SessionId, text: &str) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            debug!(%session_id, error = %err, "malformed client frame");
            broker.send_to_session(
                session_id,
                ServerEvent::Error {
                    context: "parse".into(),
                    code: ErrorCode::Rejected,
                    message: format!("malformed event: {err}"),
                },
            );
            return;
        }
    };

    let context = event.name();
    let result = apply(broker, session_id, event);

    if let Err(err) = result {
        debug!(%session_id, context, error = %err, "operation failed");
        broker.send_to_session(
            session_id,
            ServerEvent::Error {
                context: context.into(),
                code: err.code(),
                message: err.to_string(),
            },
        );
    }
}

fn apply(broker: &RoomBroker, session_id: SessionId, event: ClientEvent) -> Result<(), BrokerError> {
    match event {
        ClientEvent::JoinRoom { room_id } => broker.join_room(session_id, &room_id),
        ClientEvent::LeaveRoom { room_id } => broker.leave_room(session_id, &room_id),
        ClientEvent::SendMessage { room_id, message } => broker
            .send_message(session_id, &room_id, &message.content, &message.kind)
            .map(|_| ()),
        ClientEvent::FileUploaded {
            room_id,
            file_url,
            file_type,
        } => broker
            .file_message(session_id, &room_id, &file_url, &file_type)
            .map(|_| ()),
        ClientEvent::Typing { room_id, is_typing } => {
            broker.typing(session_id, &room_id, is_typing)
        }
        ClientEvent::AddReaction {
            room_id,
            message_id,
            emoji,
        } => broker
            .toggle_reaction(session_id, &room_id, message_id, &emoji)
            .map(|_| ()),
        ClientEvent::PinMessage {
            room_id,
            message_id,
        } => broker.toggle_pin(&room_id, message_id).map(|_| ()),
        ClientEvent::DeleteMessage {
            room_id,
            message_id,
        } => broker.delete_message(&room_id, message_id),
        ClientEvent::WhiteboardDraw { room_id, segment } => {
            broker.whiteboard_draw(session_id, &room_id, segment)
        }
        ClientEvent::WhiteboardClear { room_id } => {
            broker.whiteboard_clear(session_id, &room_id)
        }
        ClientEvent::CallUser {
            target_id,
            call_type,
            room_id,
        } => broker.call_user(session_id, &target_id, call_type, room_id),
        ClientEvent::AcceptCall { to_id, room_id } => {
            broker.accept_call(session_id, &to_id, room_id)
        }
        ClientEvent::RejectCall { to_id, room_id } => {
            broker.reject_call(session_id, &to_id, room_id)
        }
        ClientEvent::Offer {
            to_id,
            offer,
            room_id,
        } => broker.relay_offer(session_id, &to_id, offer, room_id),
        ClientEvent::Answer {
            to_id,
            answer,
            room_id,
        } => broker.relay_answer(session_id, &to_id, answer, room_id),
        ClientEvent::IceCandidate {
            to_id,
            candidate,
            room_id,
        } => broker.relay_ice_candidate(session_id, &to_id, candidate, room_id),
        ClientEvent::EndCall { room_id } => broker.end_call(session_id, &room_id),
        ClientEvent::ScreenShareStarted { room_id } => {
            broker.screen_share_started(session_id, &room_id)
        }
        ClientEvent::ScreenShareStopped { room_id } => {
            broker.screen_share_stopped(session_id, &room_id)
        }
    }
}
