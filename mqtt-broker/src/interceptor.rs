use async_trait::async_trait;
use mqtt_core::PublishPacket;

use crate::session::SessionItems;

/// Built per dispatched message (§4.6 step 2). `sender_client_id`/
/// `session_items` are the broker's own identity and `ServerSessionItems`
/// when the publish was server-originated (no sender connection).
pub struct ApplicationMessageContext {
    pub sender_client_id: String,
    pub session_items: SessionItems,
    pub application_message: Option<PublishPacket>,
    pub accept_publish: bool,
    pub close_connection: bool,
}

impl ApplicationMessageContext {
    pub fn new(sender_client_id: String, session_items: SessionItems, application_message: PublishPacket) -> Self {
        return Self {
            sender_client_id,
            session_items,
            application_message: Some(application_message),
            accept_publish: true,
            close_connection: false,
        };
    }
}

/// May mutate, veto (`accept_publish = false` or a nulled message), or
/// trigger disconnect of the sender (`close_connection = true`) for every
/// message that passes through the dispatch loop.
#[async_trait]
pub trait ApplicationMessageInterceptor: Send + Sync {
    async fn intercept(&self, ctx: &mut ApplicationMessageContext);
}

pub struct NoopApplicationMessageInterceptor;

#[async_trait]
impl ApplicationMessageInterceptor for NoopApplicationMessageInterceptor {
    async fn intercept(&self, _ctx: &mut ApplicationMessageContext) {}
}

/// Notification-only context fired when a dispatched message matched zero
/// subscribed sessions.
pub struct UndeliveredMessageContext {
    pub sender_client_id: String,
    pub session_items: SessionItems,
    pub application_message: PublishPacket,
}

#[async_trait]
pub trait UndeliveredMessageInterceptor: Send + Sync {
    async fn intercept(&self, ctx: &UndeliveredMessageContext);
}

pub struct NoopUndeliveredMessageInterceptor;

#[async_trait]
impl UndeliveredMessageInterceptor for NoopUndeliveredMessageInterceptor {
    async fn intercept(&self, _ctx: &UndeliveredMessageContext) {}
}

#[cfg(test)]
mod interceptor {
    use bytes::Bytes;
    use mqtt_core::topic::TopicName;

    use super::*;

    #[tokio::test]
    async fn noop_application_interceptor_leaves_context_unchanged() {
        let packet = PublishPacket::new(&TopicName::from_str("news").unwrap(), Bytes::new());
        let mut ctx = ApplicationMessageContext::new("server".to_string(), SessionItems::new(), packet);

        NoopApplicationMessageInterceptor.intercept(&mut ctx).await;

        assert!(ctx.accept_publish);
        assert!(!ctx.close_connection);
        assert!(ctx.application_message.is_some());
    }
}
