use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::PresenceStatus;
use crate::services::presence_service::PresenceService;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    pub conversation_id: Uuid,
}

/// Inbound frames are presence hints; everything the client needs to
/// render arrives as outbound change notifications and is re-fetched
/// over the HTTP surface.
#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: User,
    Query(params): Query<WsParams>,
) -> Result<Response, AppError> {
    if !state
        .store
        .is_participant(params.conversation_id, user.id)
        .await?
    {
        return Err(AppError::Unauthorized);
    }
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user.id, params.conversation_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid, conversation_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.registry.add_subscriber(conversation_id).await;
    tracing::debug!(%conversation_id, %user_id, "websocket connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_frame(&state, conversation_id, user_id, &text).await {
                            tracing::debug!(%conversation_id, error = %e, "ignoring bad frame");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%conversation_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    // A dropped connection must not leave a typing/recording indicator
    // stuck on for the peers.
    if let Err(e) = PresenceService::set_status(
        state.store.as_ref(),
        conversation_id,
        user_id,
        PresenceStatus::Idle,
    )
    .await
    {
        tracing::warn!(%conversation_id, %user_id, error = %e, "failed to reset presence on disconnect");
    }
    tracing::debug!(%conversation_id, %user_id, "websocket disconnected");
}

async fn handle_frame(
    state: &AppState,
    conversation_id: Uuid,
    user_id: Uuid,
    text: &str,
) -> Result<(), AppError> {
    let frame: InboundFrame = serde_json::from_str(text)
        .map_err(|e| AppError::Validation(format!("malformed frame: {e}")))?;
    let status = match frame.kind.as_str() {
        "typing" => PresenceStatus::Typing,
        "recording" => PresenceStatus::Recording,
        "idle" => PresenceStatus::Idle,
        other => {
            return Err(AppError::Validation(format!("unknown frame type: {other}")));
        }
    };
    PresenceService::set_status(state.store.as_ref(), conversation_id, user_id, status).await
}
