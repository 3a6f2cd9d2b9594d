mod common;

use async_trait::async_trait;
use bytes::Bytes;
use chat_service::blob::{BlobStore, MemoryBlobStore};
use chat_service::error::{AppError, AppResult};
use chat_service::models::MessageKind;
use chat_service::services::message_service::{MessageService, OutgoingMessage};
use chat_service::store::ChatStore;
use common::{direct_chat, store, user};

/// Stands in for an unreachable blob backend.
struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn upload(&self, _bytes: Bytes, _content_type: &str) -> AppResult<String> {
        Err(AppError::Upstream("blob backend unavailable".into()))
    }
}

#[tokio::test]
async fn send_and_read_round_trip() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    let sent = MessageService::append(
        store.as_ref(),
        &blobs,
        conversation.id,
        alice,
        OutgoingMessage::Text {
            content: "  hello bob  ".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(sent.content.as_deref(), Some("hello bob"));
    assert!(sent.read_at.is_none());

    let history = MessageService::fetch_history(store.as_ref(), conversation.id, bob)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, sent.id);

    let marked = MessageService::mark_read(store.as_ref(), conversation.id, bob)
        .await
        .unwrap();
    assert_eq!(marked, 1);

    // idempotent: nothing left to transition
    let marked_again = MessageService::mark_read(store.as_ref(), conversation.id, bob)
        .await
        .unwrap();
    assert_eq!(marked_again, 0);

    assert_eq!(store.unread_count(conversation.id, bob).await.unwrap(), 0);
}

#[tokio::test]
async fn empty_text_is_rejected_without_a_row() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    let err = MessageService::append(
        store.as_ref(),
        &blobs,
        conversation.id,
        alice,
        OutgoingMessage::Text {
            content: "   ".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(store.messages(conversation.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn non_participant_cannot_send_or_read() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let (alice, bob, mallory) = (user(), user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    let send = MessageService::append(
        store.as_ref(),
        &blobs,
        conversation.id,
        mallory,
        OutgoingMessage::Text {
            content: "hi".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(send, AppError::Unauthorized));

    let read = MessageService::fetch_history(store.as_ref(), conversation.id, mallory)
        .await
        .unwrap_err();
    assert!(matches!(read, AppError::Unauthorized));
}

#[tokio::test]
async fn failed_upload_leaves_no_message_behind() {
    let store = store();
    let blobs = FailingBlobStore;
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    let err = MessageService::append(
        store.as_ref(),
        &blobs,
        conversation.id,
        alice,
        OutgoingMessage::Media {
            kind: MessageKind::Voice,
            bytes: Bytes::from_static(b"opus data"),
            content_type: "audio/ogg".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Upstream(_)));
    assert!(store.messages(conversation.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn media_message_points_at_the_uploaded_blob() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    let message = MessageService::append(
        store.as_ref(),
        &blobs,
        conversation.id,
        alice,
        OutgoingMessage::Media {
            kind: MessageKind::File,
            bytes: Bytes::from_static(b"%PDF-1.7"),
            content_type: "application/pdf".into(),
        },
    )
    .await
    .unwrap();

    let url = message.media_url.expect("media url");
    assert!(message.content.is_none());
    let (bytes, content_type) = blobs.get(&url).await.expect("stored blob");
    assert_eq!(&bytes[..], b"%PDF-1.7");
    assert_eq!(content_type, "application/pdf");
}

#[tokio::test]
async fn history_stays_in_send_order() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    for (sender, text) in [(alice, "one"), (bob, "two"), (alice, "three")] {
        MessageService::append(
            store.as_ref(),
            &blobs,
            conversation.id,
            sender,
            OutgoingMessage::Text {
                content: text.into(),
            },
        )
        .await
        .unwrap();
    }

    let history = MessageService::fetch_history(store.as_ref(), conversation.id, alice)
        .await
        .unwrap();
    let texts: Vec<&str> = history
        .iter()
        .filter_map(|m| m.content.as_deref())
        .collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
    assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn sending_advances_conversation_activity() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;
    let before = store.conversation(conversation.id).await.unwrap();

    let message = MessageService::append(
        store.as_ref(),
        &blobs,
        conversation.id,
        alice,
        OutgoingMessage::Text {
            content: "ping".into(),
        },
    )
    .await
    .unwrap();

    let after = store.conversation(conversation.id).await.unwrap();
    assert!(after.last_activity_at >= before.last_activity_at);
    assert_eq!(after.last_activity_at, message.created_at);
}
