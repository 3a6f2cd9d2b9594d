mod common;

use std::time::Duration;

use axum::extract::ws::Message;
use chat_service::blob::MemoryBlobStore;
use chat_service::models::PresenceStatus;
use chat_service::realtime::{propagator, ConnectionRegistry};
use chat_service::services::message_service::{MessageService, OutgoingMessage};
use chat_service::services::presence_service::PresenceService;
use chat_service::store::ChatStore;
use common::{direct_chat, store, user};
use tokio::sync::mpsc::UnboundedReceiver;

async fn next_event(rx: &mut UnboundedReceiver<Message>) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event within a second")
        .expect("open channel");
    match msg {
        Message::Text(text) => serde_json::from_str(&text).expect("json payload"),
        other => panic!("unexpected frame: {other:?}"),
    }
}

async fn drain(rx: &mut UnboundedReceiver<Message>) {
    while tokio::time::timeout(Duration::from_millis(50), rx.recv())
        .await
        .is_ok()
    {}
}

#[tokio::test]
async fn appended_message_notifies_conversation_subscribers() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let registry = ConnectionRegistry::new();
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    tokio::spawn(propagator::run(store.changes(), registry.clone()));
    let mut rx = registry.add_subscriber(conversation.id).await;

    MessageService::append(
        store.as_ref(),
        &blobs,
        conversation.id,
        alice,
        OutgoingMessage::Text {
            content: "hello".into(),
        },
    )
    .await
    .unwrap();

    let event = next_event(&mut rx).await;
    assert_eq!(event["type"], "messages.changed");
    assert_eq!(event["conversation_id"], conversation.id.to_string());
}

#[tokio::test]
async fn presence_updates_notify_with_their_own_type() {
    let store = store();
    let registry = ConnectionRegistry::new();
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    tokio::spawn(propagator::run(store.changes(), registry.clone()));
    let mut rx = registry.add_subscriber(conversation.id).await;

    PresenceService::set_status(store.as_ref(), conversation.id, alice, PresenceStatus::Typing)
        .await
        .unwrap();

    let event = next_event(&mut rx).await;
    assert_eq!(event["type"], "presence.changed");
}

#[tokio::test]
async fn subscribers_only_hear_their_own_conversation() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let registry = ConnectionRegistry::new();
    let (alice, bob, carol) = (user(), user(), user());
    let with_bob = direct_chat(store.as_ref(), alice, bob).await;
    let with_carol = direct_chat(store.as_ref(), alice, carol).await;

    tokio::spawn(propagator::run(store.changes(), registry.clone()));
    let mut bob_rx = registry.add_subscriber(with_bob.id).await;
    let mut carol_rx = registry.add_subscriber(with_carol.id).await;

    MessageService::append(
        store.as_ref(),
        &blobs,
        with_bob.id,
        alice,
        OutgoingMessage::Text {
            content: "for bob only".into(),
        },
    )
    .await
    .unwrap();

    let event = next_event(&mut bob_rx).await;
    assert_eq!(event["conversation_id"], with_bob.id.to_string());
    assert!(
        tokio::time::timeout(Duration::from_millis(100), carol_rx.recv())
            .await
            .is_err(),
        "carol's conversation saw someone else's message"
    );
}

#[tokio::test]
async fn idempotent_mark_read_emits_nothing() {
    let store = store();
    let blobs = MemoryBlobStore::new();
    let registry = ConnectionRegistry::new();
    let (alice, bob) = (user(), user());
    let conversation = direct_chat(store.as_ref(), alice, bob).await;

    MessageService::append(
        store.as_ref(),
        &blobs,
        conversation.id,
        alice,
        OutgoingMessage::Text {
            content: "hi".into(),
        },
    )
    .await
    .unwrap();
    MessageService::mark_read(store.as_ref(), conversation.id, bob)
        .await
        .unwrap();

    // subscribe after the fact; a second mark_read has nothing to announce
    tokio::spawn(propagator::run(store.changes(), registry.clone()));
    let mut rx = registry.add_subscriber(conversation.id).await;
    drain(&mut rx).await;

    MessageService::mark_read(store.as_ref(), conversation.id, bob)
        .await
        .unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn closed_subscribers_are_dropped_on_broadcast() {
    let registry = ConnectionRegistry::new();
    let conversation_id = uuid::Uuid::new_v4();

    let rx = registry.add_subscriber(conversation_id).await;
    assert_eq!(registry.subscriber_count(conversation_id).await, 1);
    drop(rx);

    registry
        .broadcast(conversation_id, Message::Text("ping".into()))
        .await;
    assert_eq!(registry.subscriber_count(conversation_id).await, 0);
}
