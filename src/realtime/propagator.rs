//! Bridges the store change feed to connected clients: every row change in a
//! conversation becomes one notification to that conversation's subscribers.

use axum::extract::ws::Message;
use tokio::sync::broadcast;

use crate::store::StoreChange;

use super::{events, ConnectionRegistry};

pub async fn run(mut changes: broadcast::Receiver<StoreChange>, registry: ConnectionRegistry) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                let payload = events::to_broadcast_payload(&change);
                registry
                    .broadcast(change.conversation_id, Message::Text(payload))
                    .await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Subscribers re-fetch on the next event, so lag loses nothing
                // beyond latency.
                tracing::warn!(skipped, "change feed lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
