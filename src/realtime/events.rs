//! Change-notification payloads pushed to connected clients.
//!
//! Events carry identifiers only: subscribers re-derive their view (re-fetch
//! summaries, history, presence) on every notification instead of applying
//! deltas. Every payload is a flat JSON object:
//!
//! ```json
//! {
//!     "type": "messages.changed",
//!     "conversation_id": "uuid",
//!     "timestamp": "2026-08-23T10:30:00Z"
//! }
//! ```

use chrono::Utc;
use serde_json::json;

use crate::store::{ChangedTable, StoreChange};

pub fn event_type(table: ChangedTable) -> &'static str {
    match table {
        ChangedTable::Messages => "messages.changed",
        ChangedTable::Conversations => "conversation.updated",
        ChangedTable::Participants | ChangedTable::GroupMembers => "membership.changed",
        ChangedTable::Presence => "presence.changed",
    }
}

pub fn to_broadcast_payload(change: &StoreChange) -> String {
    json!({
        "type": event_type(change.table),
        "conversation_id": change.conversation_id,
        "timestamp": Utc::now().to_rfc3339(),
    })
    .to_string()
}
