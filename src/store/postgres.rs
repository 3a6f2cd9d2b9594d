//! Postgres backend. Queries stay single-statement; the service layer
//! compensates multi-step creations instead of leaning on multi-table
//! transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{
    Conversation, ConversationKind, Group, GroupMember, MemberRole, Message, MessageKind,
    Participant, PresenceEntry, PresenceStatus,
};
use crate::realtime::{events, pubsub};

use super::{
    direct_pair_key, ChangedTable, ChatStore, StoreChange, StoreError, StoreResult,
};

const CHANGE_FEED_CAPACITY: usize = 256;

pub struct PgStore {
    pool: Pool<Postgres>,
    redis: Option<redis::Client>,
    changes: broadcast::Sender<StoreChange>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>, redis: Option<redis::Client>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            pool,
            redis,
            changes,
        }
    }

    /// With redis configured, changes fan out through pub/sub so every
    /// instance (this one included) hears them via the psubscribe listener.
    /// Without redis, the in-process feed carries them directly.
    async fn emit(&self, table: ChangedTable, conversation_id: Uuid) {
        let change = StoreChange {
            table,
            conversation_id,
        };
        match &self.redis {
            Some(client) => {
                let payload = events::to_broadcast_payload(&change);
                if let Err(e) = pubsub::publish(client, conversation_id, &payload).await {
                    tracing::warn!(error = %e, %conversation_id, "redis publish failed; peers will catch up on the next change");
                }
            }
            None => {
                let _ = self.changes.send(change);
            }
        }
    }

    fn map_err(e: sqlx::Error) -> StoreError {
        match &e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StoreError::Conflict
            }
            _ => StoreError::Backend(e.to_string()),
        }
    }

    fn conversation_from_row(row: &sqlx::postgres::PgRow) -> Conversation {
        let kind: String = row.get("kind");
        Conversation {
            id: row.get("id"),
            kind: ConversationKind::from_db(&kind),
            name: row.get("name"),
            image_url: row.get("image_url"),
            created_at: row.get("created_at"),
            last_activity_at: row.get("last_activity_at"),
        }
    }

    fn message_from_row(row: &sqlx::postgres::PgRow) -> Message {
        let kind: String = row.get("kind");
        Message {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            sender_id: row.get("sender_id"),
            kind: MessageKind::from_db(&kind),
            content: row.get("content"),
            media_url: row.get("media_url"),
            created_at: row.get("created_at"),
            read_at: row.get("read_at"),
        }
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO conversations (id, kind, name, image_url, created_at, last_activity_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(conversation.id)
        .bind(conversation.kind.as_str())
        .bind(&conversation.name)
        .bind(&conversation.image_url)
        .bind(conversation.created_at)
        .bind(conversation.last_activity_at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;
        self.emit(ChangedTable::Conversations, conversation.id).await;
        Ok(())
    }

    async fn delete_conversation(&self, id: Uuid) -> StoreResult<()> {
        // FK cascades take participants, messages, group rows, presence and
        // the pair claim with it.
        sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        self.emit(ChangedTable::Conversations, id).await;
        Ok(())
    }

    async fn conversation(&self, id: Uuid) -> StoreResult<Conversation> {
        let row = sqlx::query(
            "SELECT id, kind, name, image_url, created_at, last_activity_at \
             FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_err)?
        .ok_or(StoreError::NotFound)?;
        Ok(Self::conversation_from_row(&row))
    }

    async fn touch_conversation(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "UPDATE conversations SET last_activity_at = $2 \
             WHERE id = $1 AND last_activity_at < $2",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;
        self.emit(ChangedTable::Conversations, id).await;
        Ok(())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT c.id, c.kind, c.name, c.image_url, c.created_at, c.last_activity_at \
             FROM conversations c \
             JOIN participants p ON c.id = p.conversation_id \
             WHERE p.user_id = $1 \
             ORDER BY c.last_activity_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(rows.iter().map(Self::conversation_from_row).collect())
    }

    async fn insert_participant(&self, participant: &Participant) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO participants (conversation_id, user_id, joined_at) VALUES ($1, $2, $3)",
        )
        .bind(participant.conversation_id)
        .bind(participant.user_id)
        .bind(participant.joined_at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;
        self.emit(ChangedTable::Participants, participant.conversation_id)
            .await;
        Ok(())
    }

    async fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM participants WHERE conversation_id = $1 AND user_id = $2")
            .bind(conversation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        self.emit(ChangedTable::Participants, conversation_id).await;
        Ok(())
    }

    async fn participants(&self, conversation_id: Uuid) -> StoreResult<Vec<Participant>> {
        let rows = sqlx::query(
            "SELECT conversation_id, user_id, joined_at FROM participants \
             WHERE conversation_id = $1 ORDER BY joined_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(rows
            .into_iter()
            .map(|row| Participant {
                conversation_id: row.get("conversation_id"),
                user_id: row.get("user_id"),
                joined_at: row.get("joined_at"),
            })
            .collect())
    }

    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT 1 AS one FROM participants WHERE conversation_id = $1 AND user_id = $2 LIMIT 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(row.is_some())
    }

    async fn claim_direct_pair(&self, a: Uuid, b: Uuid, conversation_id: Uuid) -> StoreResult<()> {
        let (low, high) = direct_pair_key(a, b);
        sqlx::query(
            "INSERT INTO direct_pairs (user_low, user_high, conversation_id) VALUES ($1, $2, $3)",
        )
        .bind(low)
        .bind(high)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(())
    }

    async fn release_direct_pair(&self, a: Uuid, b: Uuid) -> StoreResult<()> {
        let (low, high) = direct_pair_key(a, b);
        sqlx::query("DELETE FROM direct_pairs WHERE user_low = $1 AND user_high = $2")
            .bind(low)
            .bind(high)
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, kind, content, media_url, created_at, read_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.kind.as_str())
        .bind(&message.content)
        .bind(&message.media_url)
        .bind(message.created_at)
        .bind(message.read_at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;
        self.emit(ChangedTable::Messages, message.conversation_id)
            .await;
        Ok(())
    }

    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, sender_id, kind, content, media_url, created_at, read_at \
             FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(rows.iter().map(Self::message_from_row).collect())
    }

    async fn latest_message(&self, conversation_id: Uuid) -> StoreResult<Option<Message>> {
        let row = sqlx::query(
            "SELECT id, conversation_id, sender_id, kind, content, media_url, created_at, read_at \
             FROM messages WHERE conversation_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(row.as_ref().map(Self::message_from_row))
    }

    async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM messages \
             WHERE conversation_id = $1 AND sender_id <> $2 AND read_at IS NULL",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(count as u64)
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        // read_at IS NULL keeps the transition monotonic
        let result = sqlx::query(
            "UPDATE messages SET read_at = $3 \
             WHERE conversation_id = $1 AND sender_id <> $2 AND read_at IS NULL",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;
        let updated = result.rows_affected();
        if updated > 0 {
            self.emit(ChangedTable::Messages, conversation_id).await;
        }
        Ok(updated)
    }

    async fn insert_group(&self, group: &Group) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO groups (conversation_id, name, image_url, creator_id, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(group.conversation_id)
        .bind(&group.name)
        .bind(&group.image_url)
        .bind(group.creator_id)
        .bind(group.created_at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete_group(&self, conversation_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM groups WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn group(&self, conversation_id: Uuid) -> StoreResult<Option<Group>> {
        let row = sqlx::query(
            "SELECT conversation_id, name, image_url, creator_id, created_at \
             FROM groups WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(row.map(|row| Group {
            conversation_id: row.get("conversation_id"),
            name: row.get("name"),
            image_url: row.get("image_url"),
            creator_id: row.get("creator_id"),
            created_at: row.get("created_at"),
        }))
    }

    async fn insert_group_member(&self, member: &GroupMember) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO group_members (conversation_id, user_id, role) VALUES ($1, $2, $3)",
        )
        .bind(member.conversation_id)
        .bind(member.user_id)
        .bind(member.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;
        self.emit(ChangedTable::GroupMembers, member.conversation_id)
            .await;
        Ok(())
    }

    async fn remove_group_member(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM group_members WHERE conversation_id = $1 AND user_id = $2")
            .bind(conversation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        self.emit(ChangedTable::GroupMembers, conversation_id).await;
        Ok(())
    }

    async fn group_members(&self, conversation_id: Uuid) -> StoreResult<Vec<GroupMember>> {
        let rows = sqlx::query(
            "SELECT conversation_id, user_id, role FROM group_members WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let role: String = row.get("role");
                GroupMember {
                    conversation_id: row.get("conversation_id"),
                    user_id: row.get("user_id"),
                    role: MemberRole::from_db(&role),
                }
            })
            .collect())
    }

    async fn upsert_presence(&self, entry: &PresenceEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO presence_entries (conversation_id, user_id, status, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (conversation_id, user_id) \
             DO UPDATE SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at",
        )
        .bind(entry.conversation_id)
        .bind(entry.user_id)
        .bind(entry.status.as_str())
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;
        self.emit(ChangedTable::Presence, entry.conversation_id)
            .await;
        Ok(())
    }

    async fn presence(&self, conversation_id: Uuid) -> StoreResult<Vec<PresenceEntry>> {
        let rows = sqlx::query(
            "SELECT conversation_id, user_id, status, updated_at FROM presence_entries \
             WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let status: String = row.get("status");
                PresenceEntry {
                    conversation_id: row.get("conversation_id"),
                    user_id: row.get("user_id"),
                    status: PresenceStatus::from_db(&status),
                    updated_at: row.get("updated_at"),
                }
            })
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
