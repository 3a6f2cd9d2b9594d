use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{Conversation, ConversationSummary};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DirectConversationRequest {
    pub peer_id: Uuid,
}

pub async fn find_or_create_direct(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<DirectConversationRequest>,
) -> Result<Json<Conversation>, AppError> {
    let conversation =
        ConversationService::find_or_create_direct(state.store.as_ref(), user.id, body.peer_id)
            .await?;
    Ok(Json(conversation))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let summaries = ConversationService::list_conversations(state.store.as_ref(), user.id).await?;
    Ok(Json(summaries))
}

pub async fn mark_as_read(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    MessageService::mark_read(state.store.as_ref(), id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
