use std::sync::Arc;

use async_trait::async_trait;
use mqtt_core::PublishPacket;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::{
    connection::{Connection, DisconnectType},
    interceptor::{
        ApplicationMessageContext, ApplicationMessageInterceptor, UndeliveredMessageContext,
        UndeliveredMessageInterceptor,
    },
    retained::RetainedStore,
    session::{SessionItems, SessionRegistry},
};

/// One item in C5: an application message plus whoever sent it, or `None` for
/// a server-originated publish.
pub struct EnqueuedMessage {
    pub application_message: PublishPacket,
    pub sender: Option<Arc<Connection>>,
}

impl EnqueuedMessage {
    pub fn new(application_message: PublishPacket, sender: Option<Arc<Connection>>) -> Self {
        return Self {
            application_message,
            sender,
        };
    }
}

/// Unbounded multi-producer, single-consumer FIFO. Enqueue never blocks and
/// never fails under normal operation; the channel is only ever closed by
/// dropping every sender, which this broker does not do short of process
/// teardown.
#[derive(Clone)]
pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<EnqueuedMessage>,
}

impl DispatchQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EnqueuedMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        return (Self { sender }, receiver);
    }

    pub fn enqueue(&self, message: EnqueuedMessage) {
        if self.sender.send(message).is_err() {
            log::error!("dispatch queue consumer is gone; dropping application message");
        }
    }
}

/// Notification sink for the three broker-level events. Every call is
/// best-effort: the dispatch loop and cleanup path never let a failure here
/// interrupt their own work.
#[async_trait]
pub trait BrokerEvents: Send + Sync {
    async fn client_connected(&self, client_id: &str);
    async fn client_disconnected(&self, client_id: &str, disconnect_type: DisconnectType);
    async fn application_message_received(&self, sender_client_id: &str, message: &PublishPacket);
}

pub struct NoopBrokerEvents;

#[async_trait]
impl BrokerEvents for NoopBrokerEvents {
    async fn client_connected(&self, _client_id: &str) {}
    async fn client_disconnected(&self, _client_id: &str, _disconnect_type: DisconnectType) {}
    async fn application_message_received(&self, _sender_client_id: &str, _message: &PublishPacket) {}
}

/// Everything the dispatch loop needs, gathered by `Broker::start` and handed
/// off to `run` as a standalone background task.
pub struct DispatchDeps {
    pub sessions: Arc<SessionRegistry>,
    pub application_message_interceptor: Arc<dyn ApplicationMessageInterceptor>,
    pub undelivered_message_interceptor: Arc<dyn UndeliveredMessageInterceptor>,
    pub retained_store: Arc<dyn RetainedStore>,
    pub server_client_id: String,
    pub server_session_items: Arc<RwLock<SessionItems>>,
    pub events: Arc<dyn BrokerEvents>,
}

/// The C6 background task. Runs until `cancel` fires; a fault dispatching one
/// message is logged and the loop moves on to the next.
pub async fn run(
    mut receiver: mpsc::UnboundedReceiver<EnqueuedMessage>,
    deps: DispatchDeps,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            item = receiver.recv() => item,
            _ = cancel.cancelled() => {
                log::info!("dispatch loop cancelled");
                return;
            }
        };

        let Some(message) = item else {
            log::info!("dispatch queue closed; exiting dispatch loop");
            return;
        };

        dispatch_one(&deps, message).await;
    }
}

async fn dispatch_one(deps: &DispatchDeps, item: EnqueuedMessage) {
    let (sender_client_id, sender_session_items) = match &item.sender {
        Some(connection) => (
            connection.client_id().to_string(),
            connection.session().session_items().await,
        ),
        None => (
            deps.server_client_id.clone(),
            deps.server_session_items.read().await.clone(),
        ),
    };

    let mut message = item.application_message;

    // Step 2: interception.
    let mut ctx = ApplicationMessageContext::new(sender_client_id.clone(), sender_session_items.clone(), message.clone());
    deps.application_message_interceptor.intercept(&mut ctx).await;

    if ctx.close_connection {
        if let Some(sender) = item.sender.clone() {
            tokio::spawn(async move {
                sender.stop(false).await;
            });
        }
    }

    match ctx.application_message {
        Some(replaced) if ctx.accept_publish => message = replaced,
        _ => return,
    }

    // Step 3: best-effort notification.
    deps.events.application_message_received(&sender_client_id, &message).await;

    // Step 4: retained-message handoff, keyed by sender id (absent for a
    // server-originated publish).
    if message.retain() {
        let retain_sender_id = item.sender.as_ref().map(|_| sender_client_id.clone());
        deps.retained_store.retain(message.clone(), retain_sender_id).await;
    }

    // Step 5: fan-out.
    let sessions = deps.sessions.snapshot().await;
    let mut delivered = 0usize;

    for session in &sessions {
        if session.enqueue(&message, Some(&sender_client_id), false).await {
            delivered += 1;
        }
    }

    // Step 6: undelivered notification.
    if delivered == 0 {
        let undelivered_ctx = UndeliveredMessageContext {
            sender_client_id,
            session_items: sender_session_items,
            application_message: message,
        };
        deps.undelivered_message_interceptor.intercept(&undelivered_ctx).await;
    }
}

#[cfg(test)]
mod dispatch {
    use bytes::Bytes;
    use mqtt_core::{topic::TopicFilter, topic::TopicSubscription, qos::QosLevel, topic::TopicName};

    use super::*;
    use crate::{interceptor::NoopApplicationMessageInterceptor, retained::InMemoryRetainedStore};

    struct CountingUndelivered {
        count: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl UndeliveredMessageInterceptor for CountingUndelivered {
        async fn intercept(&self, _ctx: &UndeliveredMessageContext) {
            self.count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn undelivered_interceptor_fires_with_no_subscribers() {
        let sessions = Arc::new(SessionRegistry::new());
        let undelivered = Arc::new(CountingUndelivered {
            count: std::sync::atomic::AtomicUsize::new(0),
        });

        let deps = DispatchDeps {
            sessions: Arc::clone(&sessions),
            application_message_interceptor: Arc::new(NoopApplicationMessageInterceptor),
            undelivered_message_interceptor: Arc::clone(&undelivered) as Arc<dyn UndeliveredMessageInterceptor>,
            retained_store: Arc::new(InMemoryRetainedStore::new()),
            server_client_id: "server".to_string(),
            server_session_items: Arc::new(RwLock::new(SessionItems::new())),
            events: Arc::new(NoopBrokerEvents),
        };

        let message = PublishPacket::new(&TopicName::from_str("news").unwrap(), Bytes::new());
        dispatch_one(&deps, EnqueuedMessage::new(message, None)).await;

        assert_eq!(undelivered.count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribed_session_counts_as_delivered() {
        let sessions = Arc::new(SessionRegistry::new());
        let session = sessions
            .get_or_install("alice", || crate::session::Session::new("alice".to_string(), SessionItems::new()))
            .await;
        session
            .subscribe(vec![TopicSubscription::new(TopicFilter::from_str("news/#").unwrap(), QosLevel::AtMostOnce)])
            .await;

        let undelivered = Arc::new(CountingUndelivered {
            count: std::sync::atomic::AtomicUsize::new(0),
        });

        let deps = DispatchDeps {
            sessions: Arc::clone(&sessions),
            application_message_interceptor: Arc::new(NoopApplicationMessageInterceptor),
            undelivered_message_interceptor: Arc::clone(&undelivered) as Arc<dyn UndeliveredMessageInterceptor>,
            retained_store: Arc::new(InMemoryRetainedStore::new()),
            server_client_id: "server".to_string(),
            server_session_items: Arc::new(RwLock::new(SessionItems::new())),
            events: Arc::new(NoopBrokerEvents),
        };

        let message = PublishPacket::new(&TopicName::from_str("news/weather").unwrap(), Bytes::new());
        dispatch_one(&deps, EnqueuedMessage::new(message, None)).await;

        assert_eq!(undelivered.count.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
