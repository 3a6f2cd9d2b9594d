use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, ConversationKind, Group, GroupMember, MemberRole, Participant,
    MAX_GROUP_MEMBERS,
};
use crate::store::ChatStore;

pub struct GroupService;

impl GroupService {
    /// Creates the conversation, group record, member roster (creator as
    /// admin) and participant rows together. Validation runs before any
    /// write; a failure partway through compensates by deleting whatever was
    /// already created, so a half-built group is never visible.
    ///
    /// The member cap is checked here, server-side, regardless of any
    /// client-side gating at selection time.
    pub async fn create_group(
        store: &dyn ChatStore,
        creator_id: Uuid,
        name: &str,
        image_url: Option<String>,
        invitee_ids: &[Uuid],
    ) -> AppResult<Conversation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("group name cannot be empty".into()));
        }
        let mut invitees: Vec<Uuid> = Vec::new();
        for id in invitee_ids {
            if *id != creator_id && !invitees.contains(id) {
                invitees.push(*id);
            }
        }
        if invitees.is_empty() {
            return Err(AppError::Validation(
                "a group needs at least one invitee besides the creator".into(),
            ));
        }
        if 1 + invitees.len() > MAX_GROUP_MEMBERS {
            return Err(AppError::Validation(format!(
                "a group is capped at {MAX_GROUP_MEMBERS} members including the creator"
            )));
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: ConversationKind::Group,
            name: Some(name.to_string()),
            image_url: image_url.clone(),
            created_at: now,
            last_activity_at: now,
        };
        store.insert_conversation(&conversation).await?;

        let group = Group {
            conversation_id: conversation.id,
            name: name.to_string(),
            image_url,
            creator_id,
            created_at: now,
        };
        if let Err(e) = store.insert_group(&group).await {
            let _ = store.delete_conversation(conversation.id).await;
            return Err(e.into());
        }

        if let Err(e) = Self::populate_roster(store, conversation.id, creator_id, &invitees).await
        {
            let _ = store.delete_group(conversation.id).await;
            let _ = store.delete_conversation(conversation.id).await;
            return Err(e);
        }

        Ok(conversation)
    }

    async fn populate_roster(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        creator_id: Uuid,
        invitees: &[Uuid],
    ) -> AppResult<()> {
        let now = Utc::now();
        store
            .insert_group_member(&GroupMember {
                conversation_id,
                user_id: creator_id,
                role: MemberRole::Admin,
            })
            .await?;
        for user_id in invitees {
            store
                .insert_group_member(&GroupMember {
                    conversation_id,
                    user_id: *user_id,
                    role: MemberRole::Member,
                })
                .await?;
        }
        for user_id in std::iter::once(&creator_id).chain(invitees) {
            store
                .insert_participant(&Participant {
                    conversation_id,
                    user_id: *user_id,
                    joined_at: now,
                })
                .await?;
        }
        Ok(())
    }

    pub async fn members(
        store: &dyn ChatStore,
        conversation_id: Uuid,
    ) -> AppResult<Vec<GroupMember>> {
        store
            .group(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(store.group_members(conversation_id).await?)
    }

    /// Admins invite; the cap is re-validated against the current roster.
    pub async fn add_member(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        requester_id: Uuid,
        new_member_id: Uuid,
    ) -> AppResult<()> {
        store
            .group(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let members = store.group_members(conversation_id).await?;
        let requester = members
            .iter()
            .find(|m| m.user_id == requester_id)
            .ok_or(AppError::Unauthorized)?;
        if requester.role != MemberRole::Admin {
            return Err(AppError::Unauthorized);
        }
        if members.iter().any(|m| m.user_id == new_member_id) {
            return Err(AppError::Validation("already a member".into()));
        }
        if members.len() + 1 > MAX_GROUP_MEMBERS {
            return Err(AppError::Validation(format!(
                "a group is capped at {MAX_GROUP_MEMBERS} members"
            )));
        }
        store
            .insert_group_member(&GroupMember {
                conversation_id,
                user_id: new_member_id,
                role: MemberRole::Member,
            })
            .await?;
        if let Err(e) = store
            .insert_participant(&Participant {
                conversation_id,
                user_id: new_member_id,
                joined_at: Utc::now(),
            })
            .await
        {
            let _ = store
                .remove_group_member(conversation_id, new_member_id)
                .await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Anyone may leave; removing someone else takes an admin. A group never
    /// loses its last admin — that removal is refused rather than
    /// auto-promoting someone.
    pub async fn remove_member(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        requester_id: Uuid,
        member_id: Uuid,
    ) -> AppResult<()> {
        store
            .group(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let members = store.group_members(conversation_id).await?;
        let member = members
            .iter()
            .find(|m| m.user_id == member_id)
            .ok_or(AppError::NotFound)?;

        if requester_id != member_id {
            let requester = members
                .iter()
                .find(|m| m.user_id == requester_id)
                .ok_or(AppError::Unauthorized)?;
            if requester.role != MemberRole::Admin {
                return Err(AppError::Unauthorized);
            }
        }

        let admin_count = members
            .iter()
            .filter(|m| m.role == MemberRole::Admin)
            .count();
        if member.role == MemberRole::Admin && admin_count == 1 {
            return Err(AppError::Validation(
                "a group cannot lose its only admin".into(),
            ));
        }

        store.remove_group_member(conversation_id, member_id).await?;
        store.remove_participant(conversation_id, member_id).await?;
        Ok(())
    }
}
