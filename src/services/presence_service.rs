use bytes::Bytes;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageKind, PresenceEntry, PresenceStatus};
use crate::store::ChatStore;

use super::message_service::{MessageService, OutgoingMessage};

pub struct PresenceService;

impl PresenceService {
    /// Upsert semantics make typing and recording mutually exclusive for a
    /// given (conversation, user): entering one supersedes the other.
    pub async fn set_status(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        user_id: Uuid,
        status: PresenceStatus,
    ) -> AppResult<()> {
        if !store.is_participant(conversation_id, user_id).await? {
            return Err(AppError::Unauthorized);
        }
        store
            .upsert_presence(&PresenceEntry {
                conversation_id,
                user_id,
                status,
                updated_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Non-idle entries for the conversation, excluding the viewer's own.
    /// Entries older than `ttl` read as idle: clients clear their own state,
    /// but a vanished client must not leave peers a permanent indicator.
    /// Ordering puts typing ahead of recording (typing wins the display
    /// tie-break), earliest update first within a status.
    pub async fn active_peers(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        viewer_id: Uuid,
        ttl: Duration,
    ) -> AppResult<Vec<PresenceEntry>> {
        if !store.is_participant(conversation_id, viewer_id).await? {
            return Err(AppError::Unauthorized);
        }
        let now = Utc::now();
        let mut peers: Vec<PresenceEntry> = store
            .presence(conversation_id)
            .await?
            .into_iter()
            .filter(|e| e.user_id != viewer_id)
            .filter(|e| e.status != PresenceStatus::Idle)
            .filter(|e| now - e.updated_at <= ttl)
            .collect();
        peers.sort_by_key(|e| (status_rank(e.status), e.updated_at));
        Ok(peers)
    }

    pub async fn start_recording(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        Self::set_status(store, conversation_id, user_id, PresenceStatus::Recording).await
    }

    /// Closes a voice-capture bracket. Presence returns to idle on every exit
    /// path, whether the capture produced a clip, was discarded, or the
    /// device failed. A discarded capture touches neither the blob store nor
    /// the message history.
    pub async fn finish_recording(
        store: &dyn ChatStore,
        blobs: &dyn BlobStore,
        conversation_id: Uuid,
        user_id: Uuid,
        clip: Option<(Bytes, String)>,
    ) -> AppResult<Option<Message>> {
        if let Err(e) =
            Self::set_status(store, conversation_id, user_id, PresenceStatus::Idle).await
        {
            tracing::warn!(error = %e, %conversation_id, "failed to reset presence after recording");
        }
        match clip {
            Some((bytes, content_type)) => {
                let message = MessageService::append(
                    store,
                    blobs,
                    conversation_id,
                    user_id,
                    OutgoingMessage::Media {
                        kind: MessageKind::Voice,
                        bytes,
                        content_type,
                    },
                )
                .await?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }
}

fn status_rank(status: PresenceStatus) -> u8 {
    match status {
        PresenceStatus::Typing => 0,
        PresenceStatus::Recording => 1,
        PresenceStatus::Idle => 2,
    }
}
