use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{Conversation, GroupMember};
use crate::services::group_service::GroupService;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub image_url: Option<String>,
    pub member_ids: Vec<Uuid>,
}

pub async fn create_group(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Conversation>), AppError> {
    let conversation = GroupService::create_group(
        state.store.as_ref(),
        user.id,
        &body.name,
        body.image_url,
        &body.member_ids,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn list_members(
    State(state): State<AppState>,
    _user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<GroupMember>>, AppError> {
    let members = GroupService::members(state.store.as_ref(), conversation_id).await?;
    Ok(Json(members))
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

pub async fn add_member(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<AddMemberRequest>,
) -> Result<StatusCode, AppError> {
    GroupService::add_member(state.store.as_ref(), conversation_id, user.id, body.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: User,
    Path((conversation_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    GroupService::remove_member(state.store.as_ref(), conversation_id, user.id, member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
