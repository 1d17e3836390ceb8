use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    connection::{Connection, ConnectionRegistry},
    session::{Session, SessionRegistry},
    transport::ChannelAdapter,
    validator::ConnectionValidatorContext,
};

/// Serialises session/connection reconciliation (§4.4 steps 1-2) across every
/// client id. A single global gate rather than one per client id, mirroring
/// the teacher's `Arc<Mutex<DisconnectedSessions>>` convention; held only
/// across in-memory map operations, never across network I/O.
pub struct TakeoverCoordinator {
    sessions: Arc<SessionRegistry>,
    connections: Arc<ConnectionRegistry>,
    gate: Mutex<()>,
}

impl TakeoverCoordinator {
    pub fn new(sessions: Arc<SessionRegistry>, connections: Arc<ConnectionRegistry>) -> Self {
        return Self {
            sessions,
            connections,
            gate: Mutex::new(()),
        };
    }

    /// Installs the reconciled session and connection for a successful
    /// handshake, evicting whatever connection previously held `client_id`.
    pub async fn install(
        &self,
        ctx: &ConnectionValidatorContext,
        adapter: Arc<dyn ChannelAdapter>,
        cancel: CancellationToken,
    ) -> Arc<Connection> {
        let client_id = ctx
            .assigned_client_identifier
            .clone()
            .unwrap_or_else(|| ctx.connect_packet.client_id().to_string());
        let clean_session = ctx.connect_packet.clean_session();
        let session_items = ctx.session_items.clone();

        let (connection, existing_connection) = {
            let _held = self.gate.lock().await;

            let session = if clean_session {
                self.sessions
                    .replace(&client_id, Session::new(client_id.clone(), session_items))
                    .await;
                self.sessions
                    .get(&client_id)
                    .await
                    .expect("replace just installed this client id")
            } else {
                self.sessions
                    .get_or_install(&client_id, || Session::new(client_id.clone(), session_items))
                    .await
            };

            let connection = Arc::new(Connection::new(client_id.clone(), session, adapter, cancel));
            let existing_connection = self.connections.insert_or_replace(Arc::clone(&connection)).await;

            (connection, existing_connection)
        };

        if let Some(existing_connection) = existing_connection {
            log::info!("client {} took over an existing connection", client_id);
            existing_connection.stop(true).await;
        }

        return connection;
    }
}

#[cfg(test)]
mod takeover {
    use mqtt_core::ConnectPacket;

    use super::*;
    use crate::transport::tests::NullChannelAdapter;

    #[tokio::test]
    async fn install_evicts_prior_connection_for_same_client_id() {
        let sessions = Arc::new(SessionRegistry::new());
        let connections = Arc::new(ConnectionRegistry::new());
        let coordinator = TakeoverCoordinator::new(Arc::clone(&sessions), Arc::clone(&connections));

        let connect = ConnectPacket::new(false, 30, "alice".to_string(), None, None, None);
        let ctx = ConnectionValidatorContext::new(connect, "127.0.0.1:1".to_string());

        let first = coordinator
            .install(&ctx, Arc::new(NullChannelAdapter::new("a")), CancellationToken::new())
            .await;
        let second = coordinator
            .install(&ctx, Arc::new(NullChannelAdapter::new("b")), CancellationToken::new())
            .await;

        assert!(first.cancellation().is_cancelled());
        assert!(first.was_stopped_as_takeover());
        assert!(!second.cancellation().is_cancelled());
        assert_eq!(connections.get("alice").await.unwrap().endpoint(), "b");
    }
}
