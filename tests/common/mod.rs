#![allow(dead_code)]

use std::sync::Arc;

use chat_service::models::Conversation;
use chat_service::services::conversation_service::ConversationService;
use chat_service::services::group_service::GroupService;
use chat_service::store::memory::MemoryStore;
use uuid::Uuid;

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub fn user() -> Uuid {
    Uuid::new_v4()
}

pub async fn direct_chat(store: &MemoryStore, a: Uuid, b: Uuid) -> Conversation {
    ConversationService::find_or_create_direct(store, a, b)
        .await
        .expect("direct conversation")
}

pub async fn group_chat(
    store: &MemoryStore,
    creator: Uuid,
    name: &str,
    invitees: &[Uuid],
) -> Conversation {
    GroupService::create_group(store, creator, name, None, invitees)
        .await
        .expect("group conversation")
}
