use std::sync::Arc;

use mqtt_core::{topic::TopicFilter, PublishPacket};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{
    cleanup::{CleanupPath, UnknownClientError},
    config::BrokerConfig,
    connection::{Connection, ConnectionRegistry, DisconnectType},
    dispatch::{self, BrokerEvents, DispatchDeps, DispatchQueue, EnqueuedMessage, NoopBrokerEvents},
    handshake::{self, HandshakeDeps},
    interceptor::{
        ApplicationMessageInterceptor, NoopApplicationMessageInterceptor, NoopUndeliveredMessageInterceptor,
        UndeliveredMessageInterceptor,
    },
    retained::{InMemoryRetainedStore, RetainedStore},
    session::{SessionItems, SessionRegistry, SessionStatus},
    takeover::TakeoverCoordinator,
    transport::ChannelAdapter,
    validator::{AcceptAllValidator, ConnectionValidator},
};

/// Everything the broker is built from. Defaults match a bare-bones broker
/// that accepts every connect and runs no interception; every field can be
/// substituted with a custom implementation without touching C1-C9.
pub struct BrokerOptions {
    pub config: BrokerConfig,
    pub connection_validator: Arc<dyn ConnectionValidator>,
    pub application_message_interceptor: Arc<dyn ApplicationMessageInterceptor>,
    pub undelivered_message_interceptor: Arc<dyn UndeliveredMessageInterceptor>,
    pub retained_store: Arc<dyn RetainedStore>,
    pub events: Arc<dyn BrokerEvents>,
}

impl BrokerOptions {
    pub fn new(config: BrokerConfig) -> Self {
        return Self {
            config,
            connection_validator: Arc::new(AcceptAllValidator),
            application_message_interceptor: Arc::new(NoopApplicationMessageInterceptor),
            undelivered_message_interceptor: Arc::new(NoopUndeliveredMessageInterceptor),
            retained_store: Arc::new(InMemoryRetainedStore::new()),
            events: Arc::new(NoopBrokerEvents),
        };
    }
}

/// The top-level coordination core. Owns C1, C2, C4, C5, C7 and the shared
/// configuration; C3 and C6 are free functions driven by this struct's
/// state, spawned as tasks rather than methods so each attachment and the
/// dispatch loop run as independent tokio tasks.
pub struct Broker {
    config: Arc<BrokerConfig>,
    sessions: Arc<SessionRegistry>,
    connections: Arc<ConnectionRegistry>,
    cleanup: Arc<CleanupPath>,
    handshake_deps: Arc<HandshakeDeps>,
    dispatch_queue: DispatchQueue,
    dispatch_receiver: tokio::sync::Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<EnqueuedMessage>>>,
    dispatch_deps_template: DispatchDepsTemplate,
    cancel: CancellationToken,
}

/// Held separately from `DispatchDeps` because the latter is not `Clone` and
/// `start()` needs to construct it exactly once, after `dispatch_receiver`
/// has been taken.
struct DispatchDepsTemplate {
    sessions: Arc<SessionRegistry>,
    application_message_interceptor: Arc<dyn ApplicationMessageInterceptor>,
    undelivered_message_interceptor: Arc<dyn UndeliveredMessageInterceptor>,
    retained_store: Arc<dyn RetainedStore>,
    server_client_id: String,
    server_session_items: Arc<RwLock<SessionItems>>,
    events: Arc<dyn BrokerEvents>,
}

impl Broker {
    pub fn new(options: BrokerOptions) -> Arc<Self> {
        let config = Arc::new(options.config);
        let sessions = Arc::new(SessionRegistry::new());
        let connections = Arc::new(ConnectionRegistry::new());
        let cancel = CancellationToken::new();

        let cleanup = Arc::new(CleanupPath::new(
            Arc::clone(&sessions),
            Arc::clone(&connections),
            Arc::clone(&options.events),
            config.enable_persistent_sessions(),
            config.default_communication_timeout(),
        ));

        let takeover = Arc::new(TakeoverCoordinator::new(Arc::clone(&sessions), Arc::clone(&connections)));

        let (dispatch_queue, dispatch_receiver) = DispatchQueue::new();

        let handshake_deps = Arc::new(HandshakeDeps {
            config: Arc::clone(&config),
            validator: options.connection_validator,
            takeover,
            dispatch_queue: dispatch_queue.clone(),
            events: Arc::clone(&options.events),
            cleanup: Arc::clone(&cleanup),
            broker_cancel: cancel.clone(),
        });

        let dispatch_deps_template = DispatchDepsTemplate {
            sessions: Arc::clone(&sessions),
            application_message_interceptor: options.application_message_interceptor,
            undelivered_message_interceptor: options.undelivered_message_interceptor,
            retained_store: options.retained_store,
            server_client_id: config.client_id().to_string(),
            server_session_items: Arc::new(RwLock::new(SessionItems::new())),
            events: options.events,
        };

        return Arc::new(Self {
            config,
            sessions,
            connections,
            cleanup,
            handshake_deps,
            dispatch_queue,
            dispatch_receiver: tokio::sync::Mutex::new(Some(dispatch_receiver)),
            dispatch_deps_template,
            cancel,
        });
    }

    /// Spawns the C6 dispatch loop. Idempotent only in the sense that a
    /// second call finds no receiver left and logs a warning instead of
    /// spawning a duplicate consumer.
    pub async fn start(self: &Arc<Self>) {
        let receiver = self.dispatch_receiver.lock().await.take();

        let Some(receiver) = receiver else {
            log::warn!("dispatch loop already started");
            return;
        };

        let deps = DispatchDeps {
            sessions: Arc::clone(&self.dispatch_deps_template.sessions),
            application_message_interceptor: Arc::clone(&self.dispatch_deps_template.application_message_interceptor),
            undelivered_message_interceptor: Arc::clone(&self.dispatch_deps_template.undelivered_message_interceptor),
            retained_store: Arc::clone(&self.dispatch_deps_template.retained_store),
            server_client_id: self.dispatch_deps_template.server_client_id.clone(),
            server_session_items: Arc::clone(&self.dispatch_deps_template.server_session_items),
            events: Arc::clone(&self.dispatch_deps_template.events),
        };

        let cancel = self.cancel.clone();
        tokio::spawn(dispatch::run(receiver, deps, cancel));

        log::info!("broker started; bound address {}", self.config.bind_addr());
    }

    /// Cancels the broker-wide token (cascading to the dispatch loop and
    /// every live connection's child token), then traverses C2 and awaits
    /// each connection's own completion.
    pub async fn stop(&self) {
        self.cancel.cancel();

        for connection in self.connections.snapshot().await {
            connection.stop(false).await;
        }
    }

    /// C3's entry point, spawned once per accepted attachment.
    pub fn handle_client_connection(self: &Arc<Self>, adapter: Arc<dyn ChannelAdapter>) {
        let deps = Arc::clone(&self.handshake_deps);
        tokio::spawn(handshake::handle_attachment(adapter, deps));
    }

    /// Enqueues a server-originated publish (`sender` absent) or re-exposes
    /// the connection run loop's own enqueue path for testing.
    pub fn dispatch_application_message(&self, message: PublishPacket, sender: Option<Arc<Connection>>) {
        self.dispatch_queue.enqueue(EnqueuedMessage::new(message, sender));
    }

    pub async fn subscribe(&self, client_id: &str, filters: Vec<mqtt_core::topic::TopicSubscription>) -> Result<(), UnknownClientError> {
        return self.cleanup.subscribe(client_id, filters).await;
    }

    pub async fn unsubscribe(&self, client_id: &str, filters: &[TopicFilter]) -> Result<(), UnknownClientError> {
        return self.cleanup.unsubscribe(client_id, filters).await;
    }

    pub async fn delete_session(&self, client_id: &str) {
        self.cleanup.delete_session(client_id).await;
    }

    pub async fn get_client_status(&self, client_id: &str) -> Option<(String, u8)> {
        return self.connections.status(client_id).await;
    }

    pub async fn get_session_status(&self, client_id: &str) -> Option<SessionStatus> {
        return self.sessions.status(client_id).await;
    }

    pub async fn clean_up_client(&self, client_id: Option<&str>, adapter: &Arc<dyn ChannelAdapter>, disconnect_type: DisconnectType) {
        self.cleanup.clean_up_client(client_id, adapter, disconnect_type).await;
    }

    pub fn config(&self) -> &BrokerConfig {
        return &self.config;
    }
}
