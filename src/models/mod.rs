pub mod conversation;
pub mod group;
pub mod message;
pub mod presence;

pub use conversation::{Conversation, ConversationKind, ConversationSummary, Participant};
pub use group::{Group, GroupMember, MemberRole, MAX_GROUP_MEMBERS};
pub use message::{Message, MessageKind};
pub use presence::{PresenceEntry, PresenceStatus};
