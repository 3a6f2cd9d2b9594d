pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Conversation, Group, GroupMember, Message, Participant, PresenceEntry,
};

/// Which table a change landed in. Subscribers re-fetch rather than apply
/// deltas, so the feed only needs to say what kind of state moved and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangedTable {
    Conversations,
    Participants,
    Messages,
    GroupMembers,
    Presence,
}

impl ChangedTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangedTable::Conversations => "conversations",
            ChangedTable::Participants => "participants",
            ChangedTable::Messages => "messages",
            ChangedTable::GroupMembers => "group_members",
            ChangedTable::Presence => "presence",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreChange {
    pub table: ChangedTable,
    pub conversation_id: Uuid,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("unique key conflict")]
    Conflict,
    #[error("storage backend: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::Conflict => AppError::Conflict,
            StoreError::Backend(m) => AppError::Upstream(m),
        }
    }
}

/// Normalize an unordered user pair to the (low, high) key used for the
/// direct-conversation uniqueness claim.
pub fn direct_pair_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// The persistent-store contract: point queries, filtered range queries, and
/// a per-table change feed scoped by conversation. Multi-step creations are
/// compensated by the service layer, so every operation here is a single
/// logical write.
#[async_trait]
pub trait ChatStore: Send + Sync {
    // conversations
    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()>;
    /// Removes the conversation and everything hanging off it (participants,
    /// messages, group rows, presence, pair claim).
    async fn delete_conversation(&self, id: Uuid) -> StoreResult<()>;
    async fn conversation(&self, id: Uuid) -> StoreResult<Conversation>;
    async fn touch_conversation(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
    /// All conversations the user participates in, most recent activity first.
    async fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>>;

    // participants
    async fn insert_participant(&self, participant: &Participant) -> StoreResult<()>;
    async fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()>;
    async fn participants(&self, conversation_id: Uuid) -> StoreResult<Vec<Participant>>;
    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<bool>;

    // direct-pair uniqueness claim (at most one direct conversation per
    // unordered user pair; callers retry their lookup on Conflict)
    async fn claim_direct_pair(&self, a: Uuid, b: Uuid, conversation_id: Uuid) -> StoreResult<()>;
    async fn release_direct_pair(&self, a: Uuid, b: Uuid) -> StoreResult<()>;

    // messages
    async fn insert_message(&self, message: &Message) -> StoreResult<()>;
    /// Ascending by creation time, oldest first.
    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>>;
    async fn latest_message(&self, conversation_id: Uuid) -> StoreResult<Option<Message>>;
    async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<u64>;
    /// Sets `read_at` on every unread message from other senders. Returns the
    /// number of rows that transitioned; never rewinds an existing `read_at`.
    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<u64>;

    // groups
    async fn insert_group(&self, group: &Group) -> StoreResult<()>;
    async fn delete_group(&self, conversation_id: Uuid) -> StoreResult<()>;
    async fn group(&self, conversation_id: Uuid) -> StoreResult<Option<Group>>;
    async fn insert_group_member(&self, member: &GroupMember) -> StoreResult<()>;
    async fn remove_group_member(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()>;
    async fn group_members(&self, conversation_id: Uuid) -> StoreResult<Vec<GroupMember>>;

    // presence
    async fn upsert_presence(&self, entry: &PresenceEntry) -> StoreResult<()>;
    async fn presence(&self, conversation_id: Uuid) -> StoreResult<Vec<PresenceEntry>>;

    /// Per-table change feed. Lagging receivers miss events and re-sync on
    /// the next one, which the full re-fetch model tolerates.
    fn changes(&self) -> broadcast::Receiver<StoreChange>;
}
