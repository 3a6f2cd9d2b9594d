use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::guards::User;
use crate::models::{Message, MessageKind};
use crate::services::message_service::{MessageService, OutgoingMessage};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let message = MessageService::append(
        state.store.as_ref(),
        state.blobs.as_ref(),
        conversation_id,
        user.id,
        OutgoingMessage::Text {
            content: body.content,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Deserialize)]
pub struct AttachmentParams {
    pub kind: String,
}

fn media_kind(value: &str) -> AppResult<MessageKind> {
    match value {
        "image" => Ok(MessageKind::Image),
        "voice" => Ok(MessageKind::Voice),
        "file" => Ok(MessageKind::File),
        other => Err(AppError::Validation(format!(
            "unknown attachment kind: {other}"
        ))),
    }
}

pub async fn send_attachment(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<AttachmentParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let kind = media_kind(&params.kind)?;
    if body.is_empty() {
        return Err(AppError::Validation("attachment body is empty".into()));
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let message = MessageService::append(
        state.store.as_ref(),
        state.blobs.as_ref(),
        conversation_id,
        user.id,
        OutgoingMessage::Media {
            kind,
            bytes: body,
            content_type,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_message_history(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, AppError> {
    let messages =
        MessageService::fetch_history(state.store.as_ref(), conversation_id, user.id).await?;
    Ok(Json(messages))
}
