use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, ConversationKind, ConversationSummary, Message, MessageKind, Participant,
};
use crate::store::ChatStore;

/// Fixed list-view markers for non-text messages.
const IMAGE_PREVIEW: &str = "[photo]";
const VOICE_PREVIEW: &str = "[voice]";
const FILE_PREVIEW: &str = "[file]";

pub struct ConversationService;

impl ConversationService {
    /// Everything the directory list needs per conversation: peers, the
    /// group-backed flag, a preview of the latest message and the unread
    /// count. Computed from independent reads; counts and previews may be
    /// momentarily inconsistent under concurrent writes, which the realtime
    /// re-fetch model absorbs.
    pub async fn list_conversations(
        store: &dyn ChatStore,
        user_id: Uuid,
    ) -> AppResult<Vec<ConversationSummary>> {
        let conversations = store.conversations_for_user(user_id).await?;
        let mut out = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let peer_ids = store
                .participants(conversation.id)
                .await?
                .into_iter()
                .map(|p| p.user_id)
                .filter(|id| *id != user_id)
                .collect();
            let is_group = store.group(conversation.id).await?.is_some();
            let last = store.latest_message(conversation.id).await?;
            let unread_count = store.unread_count(conversation.id, user_id).await?;
            out.push(ConversationSummary {
                last_message_preview: last.as_ref().map(Self::preview),
                last_message_at: last.map(|m| m.created_at),
                peer_ids,
                is_group,
                unread_count,
                conversation,
            });
        }
        Ok(out)
    }

    pub fn preview(message: &Message) -> String {
        match message.kind {
            MessageKind::Text => message.content.clone().unwrap_or_default(),
            MessageKind::Image => IMAGE_PREVIEW.to_string(),
            MessageKind::Voice => VOICE_PREVIEW.to_string(),
            MessageKind::File => FILE_PREVIEW.to_string(),
        }
    }

    /// At most one direct conversation per unordered user pair. The lookup is
    /// a plain read; creation claims the normalized pair key, and losing that
    /// claim to a concurrent creator falls back to the winner's conversation.
    pub async fn find_or_create_direct(
        store: &dyn ChatStore,
        user_a: Uuid,
        user_b: Uuid,
    ) -> AppResult<Conversation> {
        if user_a == user_b {
            return Err(AppError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }
        if let Some(existing) = Self::find_direct(store, user_a, user_b).await? {
            return Ok(existing);
        }
        match Self::create_direct(store, user_a, user_b).await {
            Ok(conversation) => Ok(conversation),
            Err(AppError::Conflict) => Self::find_direct(store, user_a, user_b)
                .await?
                .ok_or(AppError::Conflict),
            Err(e) => Err(e),
        }
    }

    /// A direct chat is any shared conversation with exactly two participants
    /// and no backing group; the explicit group check keeps two-member groups
    /// from being misidentified.
    async fn find_direct(
        store: &dyn ChatStore,
        user_a: Uuid,
        user_b: Uuid,
    ) -> AppResult<Option<Conversation>> {
        for conversation in store.conversations_for_user(user_a).await? {
            let participants = store.participants(conversation.id).await?;
            if participants.len() != 2 {
                continue;
            }
            if !participants.iter().any(|p| p.user_id == user_b) {
                continue;
            }
            if store.group(conversation.id).await?.is_some() {
                continue;
            }
            return Ok(Some(conversation));
        }
        Ok(None)
    }

    async fn create_direct(
        store: &dyn ChatStore,
        user_a: Uuid,
        user_b: Uuid,
    ) -> AppResult<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: ConversationKind::Direct,
            name: None,
            image_url: None,
            created_at: now,
            last_activity_at: now,
        };
        store.insert_conversation(&conversation).await?;

        // The pair claim is the uniqueness guard; a conflict here means a
        // concurrent creator won and our conversation must not survive.
        if let Err(e) = store
            .claim_direct_pair(user_a, user_b, conversation.id)
            .await
        {
            let _ = store.delete_conversation(conversation.id).await;
            return Err(e.into());
        }

        for user_id in [user_a, user_b] {
            let participant = Participant {
                conversation_id: conversation.id,
                user_id,
                joined_at: now,
            };
            if let Err(e) = store.insert_participant(&participant).await {
                // A conversation with fewer than two participants must never
                // surface in a listing; unwind everything.
                let _ = store.release_direct_pair(user_a, user_b).await;
                let _ = store.delete_conversation(conversation.id).await;
                return Err(e.into());
            }
        }
        Ok(conversation)
    }
}
