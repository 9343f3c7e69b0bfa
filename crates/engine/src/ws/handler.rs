// WebSocket connection lifecycle: upgrade, command dispatch, heartbeat,
// and disconnect bookkeeping.
//
// One task per connection drives a select loop over the heartbeat tick,
// the session's outbound queue, and the socket itself; the session handle
// serializes all actual state changes.

use super::protocol as ws_protocol;
use super::{EngineRouterState, HEARTBEAT_INTERVAL_MS, HEARTBEAT_TIMEOUT_MS, MAX_FRAME_BYTES};
use crate::error::{
    current_request_id, request_id_from_headers_or_generate, with_request_id_scope, EngineError,
};
use crate::session::SessionHandle;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use maplive_common::error::{ErrorCode, LiveError, LiveResult};
use maplive_common::protocol::ws::LiveMessage;
use maplive_common::types::{MapViewport, SessionStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// What this connection is to its session. Starts unbound; the first
/// successful `Join` or presenter command binds it.
enum ConnectionRole {
    Unbound,
    Participant(Uuid),
    Presenter,
}

pub async fn ws_upgrade(
    Path(session_id): Path<Uuid>,
    State(state): State<EngineRouterState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(session) = state.registry.find(session_id).await else {
        return EngineError::from_code(ErrorCode::NotFound).into_response();
    };

    let request_id = request_id_from_headers_or_generate(&headers);
    ws.max_frame_size(MAX_FRAME_BYTES as usize).on_upgrade(move |socket| async move {
        with_request_id_scope(request_id, handle_socket(session, socket)).await;
    })
}

fn frame_size_exceeded_reason() -> String {
    format!("websocket frame exceeds maximum size of {MAX_FRAME_BYTES} bytes")
}

fn is_frame_size_violation(error: &axum::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("message too long")
        || message.contains("frame too long")
        || message.contains("too large")
        || message.contains("too big")
        || message.contains("size limit")
}

async fn close_frame_too_large(socket: &mut WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::SIZE,
            reason: frame_size_exceeded_reason().into(),
        })))
        .await;
}

/// Whether the peer failed to answer the last ping in time. A connection
/// that has not been pinged yet is never expired, and a pong received
/// after the ping clears the deadline.
fn heartbeat_expired(
    last_pong: Instant,
    ping_sent_at: Option<Instant>,
    now: Instant,
    timeout: std::time::Duration,
) -> bool {
    match ping_sent_at {
        Some(sent_at) => last_pong < sent_at && now.duration_since(sent_at) > timeout,
        None => false,
    }
}

async fn handle_socket(session: Arc<SessionHandle>, mut socket: WebSocket) {
    let request_id = current_request_id().unwrap_or_else(|| "unknown".to_string());
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<LiveMessage>();
    let mut role = ConnectionRole::Unbound;

    // Heartbeat: server pings every HEARTBEAT_INTERVAL_MS, disconnects if
    // the ping's pong has not arrived after HEARTBEAT_TIMEOUT_MS. The
    // deadline is relative to the ping that was actually sent, so a fresh
    // connection survives until its first ping goes unanswered.
    let mut heartbeat_interval =
        tokio::time::interval(std::time::Duration::from_millis(u64::from(HEARTBEAT_INTERVAL_MS)));
    heartbeat_interval.reset();
    let mut last_pong = Instant::now();
    let mut ping_sent_at: Option<Instant> = None;
    let heartbeat_timeout = std::time::Duration::from_millis(HEARTBEAT_TIMEOUT_MS);

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if heartbeat_expired(last_pong, ping_sent_at, Instant::now(), heartbeat_timeout) {
                    warn!(
                        session_id = %session.id,
                        request_id = %request_id,
                        "heartbeat timeout, disconnecting"
                    );
                    break;
                }
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
                ping_sent_at = Some(Instant::now());
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(outbound_message) => {
                        if ws_protocol::send_ws_message(&mut socket, &outbound_message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_message)) => {
                        if raw_message.len() > MAX_FRAME_BYTES as usize {
                            close_frame_too_large(&mut socket).await;
                            break;
                        }

                        let inbound = match ws_protocol::decode_message(&raw_message) {
                            Ok(message) => message,
                            Err(_) => {
                                let frame = ws_protocol::error_frame(&LiveError::new(
                                    ErrorCode::ValidationFailed,
                                    "invalid websocket frame payload",
                                ));
                                if ws_protocol::send_ws_message(&mut socket, &frame).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };

                        let replies = dispatch(&session, &mut role, &outbound_sender, inbound).await;
                        let mut send_failed = false;
                        for reply in replies {
                            if ws_protocol::send_ws_message(&mut socket, &reply).await.is_err() {
                                send_failed = true;
                                break;
                            }
                        }
                        if send_failed {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        last_pong = Instant::now();
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) if is_frame_size_violation(&error) => {
                        close_frame_too_large(&mut socket).await;
                        break;
                    }
                    Err(_) => break,
                }
            }
        }
    }

    match role {
        ConnectionRole::Participant(participant_id) => {
            debug!(session_id = %session.id, participant_id = %participant_id, "participant connection closed");
            session.mark_participant_disconnected(participant_id).await;
        }
        ConnectionRole::Presenter => {
            debug!(session_id = %session.id, "presenter connection closed");
            session.mark_presenter_disconnected().await;
        }
        ConnectionRole::Unbound => {}
    }
}

/// Apply one inbound command; direct replies (join acks, snapshots,
/// errors) go back over the socket, everything else reaches this
/// connection through the session's broadcast group.
async fn dispatch(
    session: &Arc<SessionHandle>,
    role: &mut ConnectionRole,
    outbound: &mpsc::UnboundedSender<LiveMessage>,
    inbound: LiveMessage,
) -> Vec<LiveMessage> {
    let result = apply(session, role, outbound, inbound).await;
    match result {
        Ok(replies) => replies,
        Err(error) => vec![ws_protocol::error_frame(&error)],
    }
}

async fn apply(
    session: &Arc<SessionHandle>,
    role: &mut ConnectionRole,
    outbound: &mpsc::UnboundedSender<LiveMessage>,
    inbound: LiveMessage,
) -> LiveResult<Vec<LiveMessage>> {
    match inbound {
        LiveMessage::Join { code, display_name, participant_id } => {
            // One identity per connection. Allowing a second Join would
            // strand the first participant as connected forever.
            if !matches!(role, ConnectionRole::Unbound) {
                return Err(LiveError::new(
                    ErrorCode::ValidationFailed,
                    "connection is already bound, send leave first",
                ));
            }
            if session.code().await != code.trim() {
                return Err(LiveError::new(ErrorCode::NotFound, "join code does not match"));
            }
            let joined =
                session.join(display_name, participant_id, outbound.clone()).await?;
            *role = ConnectionRole::Participant(joined.participant_id);
            Ok(vec![
                LiveMessage::Joined {
                    participant_id: joined.participant_id,
                    session_id: joined.session_id,
                    status: joined.status,
                    seq: joined.seq,
                },
                session.snapshot().await,
            ])
        }
        LiveMessage::Leave {} => {
            if let ConnectionRole::Participant(participant_id) = role {
                session.leave(*participant_id).await?;
                *role = ConnectionRole::Unbound;
                Ok(Vec::new())
            } else {
                Err(LiveError::new(ErrorCode::ValidationFailed, "not joined"))
            }
        }
        LiveMessage::StartSession { presenter_token } => {
            ensure_presenter(session, role, &presenter_token, outbound).await?;
            session.transition(&presenter_token, SessionStatus::Running).await?;
            Ok(Vec::new())
        }
        LiveMessage::PauseSession { presenter_token } => {
            ensure_presenter(session, role, &presenter_token, outbound).await?;
            session.transition(&presenter_token, SessionStatus::Paused).await?;
            Ok(Vec::new())
        }
        LiveMessage::EndSession { presenter_token } => {
            ensure_presenter(session, role, &presenter_token, outbound).await?;
            session.transition(&presenter_token, SessionStatus::Ended).await?;
            Ok(Vec::new())
        }
        LiveMessage::ActivateQuestion { presenter_token, question_id } => {
            ensure_presenter(session, role, &presenter_token, outbound).await?;
            session.activate_question(&presenter_token, question_id).await?;
            Ok(Vec::new())
        }
        LiveMessage::UpdateTeacherFocus { presenter_token, lat, lng, zoom } => {
            ensure_presenter(session, role, &presenter_token, outbound).await?;
            session.update_focus(&presenter_token, MapViewport { lat, lng, zoom }).await?;
            Ok(Vec::new())
        }
        LiveMessage::SubmitResponse { round_id, payload } => {
            let ConnectionRole::Participant(participant_id) = role else {
                return Err(LiveError::new(ErrorCode::Forbidden, "join the session first"));
            };
            session.submit_response(*participant_id, round_id, payload).await?;
            Ok(Vec::new())
        }
        LiveMessage::StateRequest {} => Ok(vec![session.snapshot().await]),
        // Server-to-client frames arriving inbound are protocol misuse.
        _ => Err(LiveError::new(ErrorCode::ValidationFailed, "unexpected server frame")),
    }
}

/// Presenter commands implicitly bind this connection as the presenter's
/// so broadcasts reach them; the token is still checked by every
/// presenter-only session method.
async fn ensure_presenter(
    session: &Arc<SessionHandle>,
    role: &mut ConnectionRole,
    presenter_token: &str,
    outbound: &mpsc::UnboundedSender<LiveMessage>,
) -> LiveResult<()> {
    if !matches!(role, ConnectionRole::Presenter) {
        session.register_presenter(presenter_token, outbound.clone()).await?;
        *role = ConnectionRole::Presenter;
    }
    Ok(())
}
