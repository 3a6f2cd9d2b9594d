use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Idle,
    Typing,
    Recording,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Idle => "idle",
            PresenceStatus::Typing => "typing",
            PresenceStatus::Recording => "recording",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "typing" => PresenceStatus::Typing,
            "recording" => PresenceStatus::Recording,
            _ => PresenceStatus::Idle,
        }
    }
}

/// Ephemeral, upsert-only activity hint for a (conversation, user) pair.
/// Latest write wins; no history is kept. Readers treat entries older than
/// the presence TTL as idle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub status: PresenceStatus,
    pub updated_at: DateTime<Utc>,
}
