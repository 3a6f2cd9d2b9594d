use bytes::Bytes;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageKind, PresenceEntry, PresenceStatus};
use crate::store::ChatStore;

/// What a client hands us to send. Media bytes are uploaded to the blob
/// store before any message row exists.
pub enum OutgoingMessage {
    Text {
        content: String,
    },
    Media {
        kind: MessageKind,
        bytes: Bytes,
        content_type: String,
    },
}

pub struct MessageService;

impl MessageService {
    pub async fn append(
        store: &dyn ChatStore,
        blobs: &dyn BlobStore,
        conversation_id: Uuid,
        sender_id: Uuid,
        outgoing: OutgoingMessage,
    ) -> AppResult<Message> {
        if !store.is_participant(conversation_id, sender_id).await? {
            return Err(AppError::Unauthorized);
        }

        let (kind, content, media_url) = match outgoing {
            OutgoingMessage::Text { content } => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    return Err(AppError::Validation("message text cannot be empty".into()));
                }
                (MessageKind::Text, Some(trimmed.to_string()), None)
            }
            OutgoingMessage::Media {
                kind,
                bytes,
                content_type,
            } => {
                if kind == MessageKind::Text {
                    return Err(AppError::Validation(
                        "text messages carry content, not media".into(),
                    ));
                }
                // Upload first; a failure here aborts the send with no row
                // written, so no message ever points at a missing blob.
                let url = blobs.upload(bytes, &content_type).await?;
                (kind, None, Some(url))
            }
        };

        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            kind,
            content,
            media_url,
            created_at: now,
            read_at: None,
        };
        store.insert_message(&message).await?;
        store.touch_conversation(conversation_id, now).await?;

        // Sending ends any typing/recording hint from this sender.
        store
            .upsert_presence(&PresenceEntry {
                conversation_id,
                user_id: sender_id,
                status: PresenceStatus::Idle,
                updated_at: now,
            })
            .await?;

        Ok(message)
    }

    pub async fn fetch_history(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> AppResult<Vec<Message>> {
        if !store.is_participant(conversation_id, viewer_id).await? {
            return Err(AppError::Unauthorized);
        }
        Ok(store.messages(conversation_id).await?)
    }

    /// Marks every unread message from other senders as read. Idempotent;
    /// returns how many messages transitioned. Callers invoke this whenever
    /// the reader has the conversation open and new messages arrive, not only
    /// on open.
    pub async fn mark_read(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> AppResult<u64> {
        if !store.is_participant(conversation_id, reader_id).await? {
            return Err(AppError::Unauthorized);
        }
        Ok(store
            .mark_read(conversation_id, reader_id, Utc::now())
            .await?)
    }
}

#[derive(Debug, Clone)]
pub struct DayGroup {
    pub label: String,
    pub date: NaiveDate,
    pub messages: Vec<Message>,
}

/// Partitions a chronologically ordered history into contiguous runs sharing
/// a calendar day in the viewer's zone. `now` supplies both the zone and the
/// reference for the "Today"/"Yesterday" labels. Contiguous-run partition,
/// not a re-sort: out-of-order input would produce repeated day buckets, and
/// history is always fetched ascending.
pub fn group_by_day<Tz: TimeZone>(messages: &[Message], now: DateTime<Tz>) -> Vec<DayGroup> {
    let today = now.date_naive();
    let yesterday = today.pred_opt().unwrap_or(today);
    let tz = now.timezone();

    let mut groups: Vec<DayGroup> = Vec::new();
    for message in messages {
        let day = message.created_at.with_timezone(&tz).date_naive();
        match groups.last_mut() {
            Some(group) if group.date == day => group.messages.push(message.clone()),
            _ => groups.push(DayGroup {
                label: day_label(day, today, yesterday),
                date: day,
                messages: vec![message.clone()],
            }),
        }
    }
    groups
}

fn day_label(day: NaiveDate, today: NaiveDate, yesterday: NaiveDate) -> String {
    if day == today {
        "Today".to_string()
    } else if day == yesterday {
        "Yesterday".to_string()
    } else {
        day.format("%B %-d, %Y").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn message_at(created_at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            kind: MessageKind::Text,
            content: Some("hi".into()),
            media_url: None,
            created_at,
            read_at: None,
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn splits_on_local_midnight() {
        // viewer at UTC: Jan 1 23:59 / Jan 2 00:01 / Jan 2 10:00
        let messages = vec![
            message_at(utc(2026, 1, 1, 23, 59)),
            message_at(utc(2026, 1, 2, 0, 1)),
            message_at(utc(2026, 1, 2, 10, 0)),
        ];
        let now = utc(2026, 1, 2, 12, 0);
        let groups = group_by_day(&messages, now);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].messages.len(), 1);
        assert_eq!(groups[1].messages.len(), 2);
        assert_eq!(groups[0].label, "Yesterday");
        assert_eq!(groups[1].label, "Today");
    }

    #[test]
    fn day_boundary_follows_viewer_zone() {
        // 23:30 UTC on Jan 1 is already Jan 2 at UTC+1
        let offset = FixedOffset::east_opt(3600).unwrap();
        let messages = vec![
            message_at(utc(2026, 1, 1, 22, 30)),
            message_at(utc(2026, 1, 1, 23, 30)),
        ];
        let now = utc(2026, 1, 2, 10, 0).with_timezone(&offset);
        let groups = group_by_day(&messages, now);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "Yesterday");
        assert_eq!(groups[1].label, "Today");
    }

    #[test]
    fn older_days_get_full_dates() {
        let messages = vec![message_at(utc(2026, 3, 5, 9, 0))];
        let now = utc(2026, 8, 23, 12, 0);
        let groups = group_by_day(&messages, now);
        assert_eq!(groups[0].label, "March 5, 2026");
    }

    #[test]
    fn empty_history_yields_no_groups() {
        let groups = group_by_day(&[], Utc::now());
        assert!(groups.is_empty());
    }
}
