use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub mod conversations;
pub mod groups;
pub mod messages;
pub mod presence;
pub mod ws;

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route(
            "/conversations",
            post(conversations::find_or_create_direct).get(conversations::list_conversations),
        )
        .route("/conversations/:id/read", post(conversations::mark_as_read))
        .route(
            "/conversations/:id/messages",
            get(messages::get_message_history).post(messages::send_message),
        )
        .route(
            "/conversations/:id/attachments",
            post(messages::send_attachment),
        )
        .route(
            "/conversations/:id/presence",
            put(presence::set_presence).get(presence::active_peers),
        )
        .route("/groups", post(groups::create_group))
        .route(
            "/groups/:id/members",
            get(groups::list_members).post(groups::add_member),
        )
        .route("/groups/:id/members/:user_id", delete(groups::remove_member))
        .route("/ws", get(ws::ws_handler))
}
