use std::{sync::Arc, time::Duration};

use mqtt_core::topic::TopicFilter;
use tokio_util::sync::CancellationToken;

use crate::{
    connection::{ConnectionRegistry, DisconnectType},
    dispatch::BrokerEvents,
    session::SessionRegistry,
    transport::ChannelAdapter,
};

/// Error returned by the admin operations when `client_id` has no session.
/// Distinct from a dispatch-path fault: the caller asked about an id that
/// simply does not exist.
#[derive(Debug)]
pub struct UnknownClientError {
    pub client_id: String,
}

impl std::fmt::Display for UnknownClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "no session for client id {}", self.client_id);
    }
}

impl std::error::Error for UnknownClientError {}

/// C7: connection removal, optional session removal, channel close,
/// notifications. Also owns the two admin operations that act directly on a
/// session (§4.8, §4.9).
pub struct CleanupPath {
    sessions: Arc<SessionRegistry>,
    connections: Arc<ConnectionRegistry>,
    events: Arc<dyn BrokerEvents>,
    enable_persistent_sessions: bool,
    disconnect_timeout: Duration,
}

impl CleanupPath {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        connections: Arc<ConnectionRegistry>,
        events: Arc<dyn BrokerEvents>,
        enable_persistent_sessions: bool,
        disconnect_timeout: Duration,
    ) -> Self {
        return Self {
            sessions,
            connections,
            events,
            enable_persistent_sessions,
            disconnect_timeout,
        };
    }

    /// §4.7. `client_id` is `None` when the handshake never got far enough to
    /// assign one (no session or connection was ever installed).
    pub async fn clean_up_client(&self, client_id: Option<&str>, adapter: &Arc<dyn ChannelAdapter>, disconnect_type: DisconnectType) {
        if let Some(client_id) = client_id {
            if disconnect_type != DisconnectType::Takeover {
                self.connections.try_remove(client_id).await;

                if !self.enable_persistent_sessions {
                    self.delete_session(client_id).await;
                }
            }
        }

        let cancel = CancellationToken::new();
        if let Err(err) = adapter.disconnect(self.disconnect_timeout, &cancel).await {
            log::warn!("failed disconnecting channel adapter for {:?}: {}", client_id, err);
        }

        if let Some(client_id) = client_id {
            self.events.client_disconnected(client_id, disconnect_type).await;
        }
    }

    /// §4.8. Idempotent: a missing entry is not an error.
    pub async fn delete_session(&self, client_id: &str) {
        if let Some(connection) = self.connections.try_remove(client_id).await {
            connection.stop(false).await;
        }

        self.sessions.try_remove(client_id).await;
    }

    /// §4.9.
    pub async fn subscribe(&self, client_id: &str, filters: Vec<mqtt_core::topic::TopicSubscription>) -> Result<(), UnknownClientError> {
        let session = self.sessions.get(client_id).await.ok_or_else(|| UnknownClientError {
            client_id: client_id.to_string(),
        })?;
        session.subscribe(filters).await;
        return Ok(());
    }

    /// §4.9.
    pub async fn unsubscribe(&self, client_id: &str, filters: &[TopicFilter]) -> Result<(), UnknownClientError> {
        let session = self.sessions.get(client_id).await.ok_or_else(|| UnknownClientError {
            client_id: client_id.to_string(),
        })?;
        session.unsubscribe(filters).await;
        return Ok(());
    }
}

#[cfg(test)]
mod cleanup {
    use super::*;
    use crate::{dispatch::NoopBrokerEvents, session::Session, transport::tests::NullChannelAdapter};

    fn path() -> CleanupPath {
        return CleanupPath::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(ConnectionRegistry::new()),
            Arc::new(NoopBrokerEvents),
            false,
            Duration::from_millis(50),
        );
    }

    #[tokio::test]
    async fn takeover_disconnect_leaves_session_and_connection_alone() {
        let path = path();
        path.sessions
            .get_or_install("alice", || Session::new("alice".to_string(), Default::default()))
            .await;

        let adapter: Arc<dyn ChannelAdapter> = Arc::new(NullChannelAdapter::new("a"));
        path.clean_up_client(Some("alice"), &adapter, DisconnectType::Takeover).await;

        assert!(path.sessions.contains("alice").await);
    }

    #[tokio::test]
    async fn normal_disconnect_without_persistence_drops_session() {
        let path = path();
        path.sessions
            .get_or_install("bob", || Session::new("bob".to_string(), Default::default()))
            .await;

        let adapter: Arc<dyn ChannelAdapter> = Arc::new(NullChannelAdapter::new("a"));
        path.clean_up_client(Some("bob"), &adapter, DisconnectType::Normal).await;

        assert!(!path.sessions.contains("bob").await);
    }

    #[tokio::test]
    async fn subscribe_on_unknown_client_is_an_error() {
        let path = path();
        let filter = TopicFilter::from_str("news/#").unwrap();
        let err = path
            .unsubscribe("nobody", &[filter])
            .await
            .expect_err("unknown client should fail");

        assert_eq!(err.client_id, "nobody");
    }
}
