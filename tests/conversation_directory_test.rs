mod common;

use chat_service::error::AppError;
use chat_service::services::conversation_service::ConversationService;
use chat_service::services::message_service::{MessageService, OutgoingMessage};
use chat_service::store::ChatStore;
use common::{direct_chat, group_chat, store, user};

use chat_service::blob::MemoryBlobStore;

#[tokio::test]
async fn direct_conversation_is_deduplicated_in_both_orders() {
    let store = store();
    let (alice, bob) = (user(), user());

    let first = direct_chat(store.as_ref(), alice, bob).await;
    let again = direct_chat(store.as_ref(), alice, bob).await;
    let reversed = direct_chat(store.as_ref(), bob, alice).await;

    assert_eq!(first.id, again.id);
    assert_eq!(first.id, reversed.id);
    assert_eq!(store.conversations_for_user(alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn self_conversation_is_rejected() {
    let store = store();
    let alice = user();
    let err = ConversationService::find_or_create_direct(store.as_ref(), alice, alice)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn two_member_group_is_not_reused_as_direct_chat() {
    let store = store();
    let (alice, bob) = (user(), user());

    let group = group_chat(store.as_ref(), alice, "pair project", &[bob]).await;
    let direct = direct_chat(store.as_ref(), alice, bob).await;

    assert_ne!(group.id, direct.id);
    assert_eq!(store.conversations_for_user(alice).await.unwrap().len(), 2);
}

#[tokio::test]
async fn listing_reflects_unread_counts_and_previews() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    for text in ["hi", "you there?"] {
        MessageService::append(
            store.as_ref(),
            &blobs,
            conversation.id,
            bob,
            OutgoingMessage::Text {
                content: text.into(),
            },
        )
        .await
        .unwrap();
    }

    let summaries = ConversationService::list_conversations(store.as_ref(), alice)
        .await
        .unwrap();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.unread_count, 2);
    assert_eq!(summary.peer_ids, vec![bob]);
    assert!(!summary.is_group);
    assert_eq!(summary.last_message_preview.as_deref(), Some("you there?"));

    // the sender reads their own messages as already read
    let bob_view = ConversationService::list_conversations(store.as_ref(), bob)
        .await
        .unwrap();
    assert_eq!(bob_view[0].unread_count, 0);
}

#[tokio::test]
async fn media_messages_preview_as_markers() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    MessageService::append(
        store.as_ref(),
        &blobs,
        conversation.id,
        bob,
        OutgoingMessage::Media {
            kind: chat_service::models::MessageKind::Image,
            bytes: bytes::Bytes::from_static(b"\x89PNG"),
            content_type: "image/png".into(),
        },
    )
    .await
    .unwrap();

    let summaries = ConversationService::list_conversations(store.as_ref(), alice)
        .await
        .unwrap();
    assert_eq!(summaries[0].last_message_preview.as_deref(), Some("[photo]"));
}

#[tokio::test]
async fn listing_orders_by_most_recent_activity() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let (alice, bob, carol) = (user(), user(), user());

    let with_bob = direct_chat(store.as_ref(), alice, bob).await;
    let with_carol = direct_chat(store.as_ref(), alice, carol).await;

    // a new message in the older conversation moves it back to the top
    MessageService::append(
        store.as_ref(),
        &blobs,
        with_bob.id,
        bob,
        OutgoingMessage::Text {
            content: "bump".into(),
        },
    )
    .await
    .unwrap();

    let summaries = ConversationService::list_conversations(store.as_ref(), alice)
        .await
        .unwrap();
    assert_eq!(summaries[0].conversation.id, with_bob.id);
    assert_eq!(summaries[1].conversation.id, with_carol.id);
}

#[tokio::test]
async fn losing_the_pair_claim_falls_back_to_the_winner() {
    let store = store();
    let (alice, bob) = (user(), user());

    // simulate the concurrent winner by claiming the pair out of band
    let winner = direct_chat(store.as_ref(), alice, bob).await;
    let loser = direct_chat(store.as_ref(), bob, alice).await;
    assert_eq!(winner.id, loser.id);

    // exactly one conversation and exactly two participants survive
    let conversations = store.conversations_for_user(bob).await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(store.participants(winner.id).await.unwrap().len(), 2);
}
