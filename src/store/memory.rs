//! In-memory backend. Backs every test and doubles as a single-process
//! fallback when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::models::{
    Conversation, Group, GroupMember, Message, Participant, PresenceEntry,
};

use super::{
    direct_pair_key, ChangedTable, ChatStore, StoreChange, StoreError, StoreResult,
};

const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    participants: HashMap<Uuid, Vec<Participant>>,
    direct_pairs: HashMap<(Uuid, Uuid), Uuid>,
    messages: HashMap<Uuid, Vec<Message>>,
    groups: HashMap<Uuid, Group>,
    group_members: HashMap<Uuid, Vec<GroupMember>>,
    presence: HashMap<(Uuid, Uuid), PresenceEntry>,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            changes,
        }
    }

    fn emit(&self, table: ChangedTable, conversation_id: Uuid) {
        // No receivers is fine; the feed is best-effort.
        let _ = self.changes.send(StoreChange {
            table,
            conversation_id,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.conversations.contains_key(&conversation.id) {
            return Err(StoreError::Conflict);
        }
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        drop(inner);
        self.emit(ChangedTable::Conversations, conversation.id);
        Ok(())
    }

    async fn delete_conversation(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.conversations.remove(&id);
        inner.participants.remove(&id);
        inner.messages.remove(&id);
        inner.groups.remove(&id);
        inner.group_members.remove(&id);
        inner.presence.retain(|(conv, _), _| *conv != id);
        inner.direct_pairs.retain(|_, conv| *conv != id);
        drop(inner);
        self.emit(ChangedTable::Conversations, id);
        Ok(())
    }

    async fn conversation(&self, id: Uuid) -> StoreResult<Conversation> {
        let inner = self.inner.read().await;
        inner
            .conversations
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn touch_conversation(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        if at > conversation.last_activity_at {
            conversation.last_activity_at = at;
        }
        drop(inner);
        self.emit(ChangedTable::Conversations, id);
        Ok(())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Conversation> = inner
            .participants
            .iter()
            .filter(|(_, list)| list.iter().any(|p| p.user_id == user_id))
            .filter_map(|(conv_id, _)| inner.conversations.get(conv_id).cloned())
            .collect();
        out.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(out)
    }

    async fn insert_participant(&self, participant: &Participant) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner
            .conversations
            .contains_key(&participant.conversation_id)
        {
            return Err(StoreError::NotFound);
        }
        let list = inner
            .participants
            .entry(participant.conversation_id)
            .or_default();
        if list.iter().any(|p| p.user_id == participant.user_id) {
            return Err(StoreError::Conflict);
        }
        list.push(participant.clone());
        drop(inner);
        self.emit(ChangedTable::Participants, participant.conversation_id);
        Ok(())
    }

    async fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(list) = inner.participants.get_mut(&conversation_id) {
            list.retain(|p| p.user_id != user_id);
        }
        drop(inner);
        self.emit(ChangedTable::Participants, conversation_id);
        Ok(())
    }

    async fn participants(&self, conversation_id: Uuid) -> StoreResult<Vec<Participant>> {
        let inner = self.inner.read().await;
        Ok(inner
            .participants
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .participants
            .get(&conversation_id)
            .map(|list| list.iter().any(|p| p.user_id == user_id))
            .unwrap_or(false))
    }

    async fn claim_direct_pair(&self, a: Uuid, b: Uuid, conversation_id: Uuid) -> StoreResult<()> {
        let key = direct_pair_key(a, b);
        let mut inner = self.inner.write().await;
        if inner.direct_pairs.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        inner.direct_pairs.insert(key, conversation_id);
        Ok(())
    }

    async fn release_direct_pair(&self, a: Uuid, b: Uuid) -> StoreResult<()> {
        let key = direct_pair_key(a, b);
        let mut inner = self.inner.write().await;
        inner.direct_pairs.remove(&key);
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound);
        }
        let list = inner.messages.entry(message.conversation_id).or_default();
        list.push(message.clone());
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        drop(inner);
        self.emit(ChangedTable::Messages, message.conversation_id);
        Ok(())
    }

    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn latest_message(&self, conversation_id: Uuid) -> StoreResult<Option<Message>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .get(&conversation_id)
            .and_then(|list| list.last().cloned()))
    }

    async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .get(&conversation_id)
            .map(|list| {
                list.iter()
                    .filter(|m| m.sender_id != user_id && m.read_at.is_none())
                    .count() as u64
            })
            .unwrap_or(0))
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let mut updated = 0u64;
        if let Some(list) = inner.messages.get_mut(&conversation_id) {
            for message in list.iter_mut() {
                if message.sender_id != reader_id && message.read_at.is_none() {
                    message.read_at = Some(at);
                    updated += 1;
                }
            }
        }
        drop(inner);
        if updated > 0 {
            self.emit(ChangedTable::Messages, conversation_id);
        }
        Ok(updated)
    }

    async fn insert_group(&self, group: &Group) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(&group.conversation_id) {
            return Err(StoreError::NotFound);
        }
        if inner.groups.contains_key(&group.conversation_id) {
            return Err(StoreError::Conflict);
        }
        inner.groups.insert(group.conversation_id, group.clone());
        Ok(())
    }

    async fn delete_group(&self, conversation_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.groups.remove(&conversation_id);
        inner.group_members.remove(&conversation_id);
        Ok(())
    }

    async fn group(&self, conversation_id: Uuid) -> StoreResult<Option<Group>> {
        let inner = self.inner.read().await;
        Ok(inner.groups.get(&conversation_id).cloned())
    }

    async fn insert_group_member(&self, member: &GroupMember) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.groups.contains_key(&member.conversation_id) {
            return Err(StoreError::NotFound);
        }
        let list = inner
            .group_members
            .entry(member.conversation_id)
            .or_default();
        if list.iter().any(|m| m.user_id == member.user_id) {
            return Err(StoreError::Conflict);
        }
        list.push(member.clone());
        drop(inner);
        self.emit(ChangedTable::GroupMembers, member.conversation_id);
        Ok(())
    }

    async fn remove_group_member(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(list) = inner.group_members.get_mut(&conversation_id) {
            list.retain(|m| m.user_id != user_id);
        }
        drop(inner);
        self.emit(ChangedTable::GroupMembers, conversation_id);
        Ok(())
    }

    async fn group_members(&self, conversation_id: Uuid) -> StoreResult<Vec<GroupMember>> {
        let inner = self.inner.read().await;
        Ok(inner
            .group_members
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_presence(&self, entry: &PresenceEntry) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .presence
            .insert((entry.conversation_id, entry.user_id), entry.clone());
        drop(inner);
        self.emit(ChangedTable::Presence, entry.conversation_id);
        Ok(())
    }

    async fn presence(&self, conversation_id: Uuid) -> StoreResult<Vec<PresenceEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .presence
            .iter()
            .filter(|((conv, _), _)| *conv == conversation_id)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConversationKind;

    fn conversation() -> Conversation {
        let now = Utc::now();
        Conversation {
            id: Uuid::new_v4(),
            kind: ConversationKind::Direct,
            name: None,
            image_url: None,
            created_at: now,
            last_activity_at: now,
        }
    }

    #[tokio::test]
    async fn pair_claim_conflicts_on_second_claim() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = conversation();
        store.insert_conversation(&conv).await.unwrap();
        store.claim_direct_pair(a, b, conv.id).await.unwrap();
        // reversed order hits the same normalized key
        let err = store.claim_direct_pair(b, a, conv.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn delete_conversation_cascades() {
        let store = MemoryStore::new();
        let conv = conversation();
        let user = Uuid::new_v4();
        store.insert_conversation(&conv).await.unwrap();
        store
            .insert_participant(&Participant {
                conversation_id: conv.id,
                user_id: user,
                joined_at: Utc::now(),
            })
            .await
            .unwrap();
        store.delete_conversation(conv.id).await.unwrap();
        assert!(store.participants(conv.id).await.unwrap().is_empty());
        assert!(store.conversation(conv.id).await.is_err());
    }
}
