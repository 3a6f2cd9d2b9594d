use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{PresenceEntry, PresenceStatus};
use crate::services::presence_service::PresenceService;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SetPresenceRequest {
    pub status: PresenceStatus,
}

pub async fn set_presence(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SetPresenceRequest>,
) -> Result<StatusCode, AppError> {
    PresenceService::set_status(state.store.as_ref(), conversation_id, user.id, body.status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn active_peers(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<PresenceEntry>>, AppError> {
    let peers = PresenceService::active_peers(
        state.store.as_ref(),
        conversation_id,
        user.id,
        state.config.presence_ttl(),
    )
    .await?;
    Ok(Json(peers))
}
