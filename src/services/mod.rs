pub mod conversation_service;
pub mod group_service;
pub mod message_service;
pub mod presence_service;
