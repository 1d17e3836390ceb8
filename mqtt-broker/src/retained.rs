use std::collections::HashMap;

use async_trait::async_trait;
use mqtt_core::{topic::TopicName, PublishPacket};
use tokio::sync::RwLock;

/// Pluggable last-value-per-topic store consulted by the dispatch loop (C6
/// step 4) and by a subscribing session (outside this core's scope). Keyed by
/// topic name; an empty payload clears the retained entry, matching the
/// teacher's one-retained-message-per-topic semantics. `sender_id` is `None`
/// for a server-originated publish.
#[async_trait]
pub trait RetainedStore: Send + Sync {
    async fn retain(&self, message: PublishPacket, sender_id: Option<String>);
    async fn get(&self, topic: &TopicName) -> Option<RetainedMessage>;
}

/// A stored retained message plus who last retained it.
#[derive(Debug, Clone)]
pub struct RetainedMessage {
    pub message: PublishPacket,
    pub sender_id: Option<String>,
}

pub struct InMemoryRetainedStore {
    messages: RwLock<HashMap<TopicName, RetainedMessage>>,
}

impl InMemoryRetainedStore {
    pub fn new() -> Self {
        return Self {
            messages: RwLock::new(HashMap::new()),
        };
    }
}

#[async_trait]
impl RetainedStore for InMemoryRetainedStore {
    async fn retain(&self, message: PublishPacket, sender_id: Option<String>) {
        let mut messages = self.messages.write().await;
        let topic = message.topic().clone();

        if message.payload().len() == 0 {
            messages.remove(&topic);
        } else {
            messages.insert(topic, RetainedMessage { message, sender_id });
        }
    }

    async fn get(&self, topic: &TopicName) -> Option<RetainedMessage> {
        return self.messages.read().await.get(topic).cloned();
    }
}

#[cfg(test)]
mod retained {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn retain_then_clear_with_empty_payload() {
        let store = InMemoryRetainedStore::new();
        let topic = TopicName::from_str("news").unwrap();

        let message = PublishPacket::new(&topic, Bytes::from_static(b"hello"));
        store.retain(message, Some("alice".to_string())).await;
        let retained = store.get(&topic).await.expect("message was retained");
        assert_eq!(retained.sender_id.as_deref(), Some("alice"));

        let clear = PublishPacket::new(&topic, Bytes::new());
        store.retain(clear, Some("alice".to_string())).await;
        assert!(store.get(&topic).await.is_none());
    }

    #[tokio::test]
    async fn server_originated_retain_has_no_sender_id() {
        let store = InMemoryRetainedStore::new();
        let topic = TopicName::from_str("news").unwrap();

        let message = PublishPacket::new(&topic, Bytes::from_static(b"hello"));
        store.retain(message, None).await;

        let retained = store.get(&topic).await.expect("message was retained");
        assert!(retained.sender_id.is_none());
    }
}
