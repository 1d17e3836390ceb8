use std::{
    collections::HashMap,
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    time::Instant,
};

use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::{session::Session, transport::ChannelAdapter};

/// Why a connection's run loop ended, handed to the cleanup path (C7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectType {
    /// Client sent DISCONNECT.
    Normal,
    /// Adapter error or communication timeout.
    Dropped,
    /// Evicted by a later connection for the same client id.
    Takeover,
}

/// One live network attachment, bound to exactly one `Session`. Stored in
/// `ConnectionRegistry` behind an `Arc` so `stop` can be called from the
/// takeover coordinator or the dispatch loop while the owning task is still
/// driving its run loop. The adapter is boxed so the registry is not generic
/// over a transport type; implementers can substitute another adapter
/// without touching C1-C9.
pub struct Connection {
    client_id: String,
    session: Arc<Session>,
    adapter: Arc<dyn ChannelAdapter>,
    connected_at: Instant,
    last_activity: RwLock<Instant>,
    cancel: CancellationToken,
    done: Notify,
    stopped_as_takeover: AtomicBool,
}

impl Connection {
    pub fn new(
        client_id: String,
        session: Arc<Session>,
        adapter: Arc<dyn ChannelAdapter>,
        cancel: CancellationToken,
    ) -> Self {
        return Self {
            client_id,
            session,
            adapter,
            connected_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
            cancel,
            done: Notify::new(),
            stopped_as_takeover: AtomicBool::new(false),
        };
    }

    pub fn client_id(&self) -> &str {
        return &self.client_id;
    }

    pub fn session(&self) -> &Arc<Session> {
        return &self.session;
    }

    pub fn adapter(&self) -> &Arc<dyn ChannelAdapter> {
        return &self.adapter;
    }

    pub fn endpoint(&self) -> &str {
        return self.adapter.endpoint();
    }

    pub fn protocol_version(&self) -> u8 {
        return self.adapter.protocol_version();
    }

    pub fn connected_at(&self) -> Instant {
        return self.connected_at;
    }

    pub async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    pub fn cancellation(&self) -> &CancellationToken {
        return &self.cancel;
    }

    /// Signals the run loop to end at its next suspension point. Per §4.4
    /// step 3 this is awaited outside the takeover gate, so unrelated client
    /// ids can keep connecting while a slow eviction drains.
    pub async fn stop(&self, is_takeover: bool) {
        if is_takeover {
            self.stopped_as_takeover.store(true, Ordering::SeqCst);
        }
        self.cancel.cancel();
        self.done.notified().await;
    }

    /// Called by the run loop once its cleanup has actually finished, waking
    /// any `stop()` caller awaiting completion.
    pub fn mark_done(&self) {
        self.done.notify_one();
    }

    /// Consulted by the run loop once cancellation fires without an explicit
    /// DISCONNECT or adapter error having already decided the disconnect type.
    pub fn was_stopped_as_takeover(&self) -> bool {
        return self.stopped_as_takeover.load(Ordering::SeqCst);
    }
}

/// Map `client_id -> Connection`; owns every live connection. Same shape as
/// `SessionRegistry`.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        return Self {
            connections: RwLock::new(HashMap::new()),
        };
    }

    /// Installs `connection`, returning whatever connection previously
    /// occupied `client_id`, if any. The takeover coordinator stops the
    /// displaced connection after releasing the reconciliation gate.
    pub async fn insert_or_replace(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        return connections.insert(connection.client_id().to_string(), connection);
    }

    pub async fn try_remove(&self, client_id: &str) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        return connections.remove(client_id);
    }

    pub async fn get(&self, client_id: &str) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        return connections.get(client_id).cloned();
    }

    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().await;
        return connections.values().cloned().collect();
    }

    /// Used by `get_client_status`: whether `client_id` currently has a live
    /// connection and its endpoint/protocol version.
    pub async fn status(&self, client_id: &str) -> Option<(String, u8)> {
        let connections = self.connections.read().await;
        return connections
            .get(client_id)
            .map(|c| (c.endpoint().to_string(), c.protocol_version()));
    }
}
