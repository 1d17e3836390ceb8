use std::sync::Arc;

use mqtt_core::{ConnAckPacket, ConnectReturnCode, MqttPacket, PublishPacket};
use tokio_util::sync::CancellationToken;

use crate::{
    cleanup::CleanupPath,
    config::BrokerConfig,
    connection::{Connection, DisconnectType},
    dispatch::{BrokerEvents, DispatchQueue, EnqueuedMessage},
    takeover::TakeoverCoordinator,
    transport::ChannelAdapter,
    validator::{ConnectionValidator, ConnectionValidatorContext},
};

/// Everything `handle_attachment` and the connection run loop need, gathered
/// once by the broker and shared across every attachment.
pub struct HandshakeDeps {
    pub config: Arc<BrokerConfig>,
    pub validator: Arc<dyn ConnectionValidator>,
    pub takeover: Arc<TakeoverCoordinator>,
    pub dispatch_queue: DispatchQueue,
    pub events: Arc<dyn BrokerEvents>,
    pub cleanup: Arc<CleanupPath>,
    pub broker_cancel: CancellationToken,
}

/// C3's public contract. Always falls through to C7, however the attachment
/// ends: rejected handshake, dropped connection, or broker cancellation.
pub async fn handle_attachment(adapter: Arc<dyn ChannelAdapter>, deps: Arc<HandshakeDeps>) {
    let connection = match run_handshake(&adapter, &deps).await {
        Some(connection) => connection,
        None => {
            deps.cleanup.clean_up_client(None, &adapter, DisconnectType::Dropped).await;
            return;
        }
    };

    deps.events.client_connected(connection.client_id()).await;

    let disconnect_type = run_connection_loop(&connection, &adapter, &deps).await;

    deps.cleanup
        .clean_up_client(Some(connection.client_id()), &adapter, disconnect_type)
        .await;
}

/// Steps 1-6 of §4.3. Returns the installed `Connection` on success, `None`
/// on every rejection path (no session or connection is ever installed for
/// those).
async fn run_handshake(adapter: &Arc<dyn ChannelAdapter>, deps: &Arc<HandshakeDeps>) -> Option<Arc<Connection>> {
    let timeout = deps.config.default_communication_timeout();

    let first_packet = match adapter.receive_packet(timeout, &deps.broker_cancel).await {
        Ok(Some(packet)) => packet,
        Ok(None) => {
            log::warn!("no packet received from {} before the communication timeout", adapter.endpoint());
            return None;
        }
        Err(err) => {
            log::warn!("failed reading first packet from {}: {}", adapter.endpoint(), err);
            return None;
        }
    };

    let connect_packet = match first_packet {
        MqttPacket::Connect(connect) => connect,
        _ => {
            log::warn!("[MQTT-3.1.0-1] first packet from {} was not CONNECT", adapter.endpoint());
            return None;
        }
    };

    let mut ctx = ConnectionValidatorContext::new(connect_packet, adapter.endpoint().to_string());
    deps.validator.validate(&mut ctx).await;

    assign_client_identifier(adapter, &mut ctx);

    if ctx.reason_code != ConnectReturnCode::Accept {
        let conn_ack = adapter.create_conn_ack_packet(&ctx);
        send_conn_ack(adapter, conn_ack, timeout, &deps.broker_cancel).await;
        return None;
    }

    let conn_cancel = deps.broker_cancel.child_token();
    let connection = deps.takeover.install(&ctx, Arc::clone(adapter), conn_cancel).await;

    let conn_ack = ConnAckPacket::new(false, ConnectReturnCode::Accept);
    send_conn_ack(adapter, conn_ack, timeout, &deps.broker_cancel).await;

    return Some(connection);
}

/// Step 4: an empty client id is only fixable against a v5 attachment that
/// had a validator-assigned identifier; otherwise the handshake is rejected.
fn assign_client_identifier(adapter: &Arc<dyn ChannelAdapter>, ctx: &mut ConnectionValidatorContext) {
    if !ctx.connect_packet.client_id().is_empty() {
        return;
    }

    if adapter.protocol_version() >= 5 {
        if let Some(assigned) = ctx.assigned_client_identifier.clone() {
            if !assigned.is_empty() {
                return;
            }
        }
    }

    ctx.reason_code = ConnectReturnCode::IdentifierRejected;
}

async fn send_conn_ack(
    adapter: &Arc<dyn ChannelAdapter>,
    conn_ack: ConnAckPacket,
    timeout: std::time::Duration,
    cancel: &CancellationToken,
) {
    let packet = MqttPacket::ConnAck(conn_ack);
    if let Err(err) = adapter.send_packet(&packet, timeout, cancel).await {
        log::warn!("failed sending CONNACK to {}: {}", adapter.endpoint(), err);
    }
}

/// The part of C3 that runs after the handshake: reads subsequent packets
/// and dispatches by type until the channel closes, errors, or the broker
/// cancels. Always returns the disconnect type to hand to C7.
async fn run_connection_loop(
    connection: &Arc<Connection>,
    adapter: &Arc<dyn ChannelAdapter>,
    deps: &Arc<HandshakeDeps>,
) -> DisconnectType {
    let timeout = deps.config.default_communication_timeout();

    loop {
        if connection.cancellation().is_cancelled() {
            let disconnect_type = if connection.was_stopped_as_takeover() {
                DisconnectType::Takeover
            } else {
                DisconnectType::Dropped
            };
            connection.mark_done();
            return disconnect_type;
        }

        let packet = adapter.receive_packet(timeout, connection.cancellation()).await;

        match packet {
            Ok(Some(MqttPacket::Publish(publish))) => {
                connection.touch().await;
                handle_publish(connection, &deps.dispatch_queue, publish);
            }
            Ok(Some(MqttPacket::Subscribe(subscribe))) => {
                connection.touch().await;
                handle_subscribe(connection, adapter, subscribe, timeout).await;
            }
            Ok(Some(MqttPacket::Unsubscribe(unsubscribe))) => {
                connection.touch().await;
                handle_unsubscribe(connection, adapter, unsubscribe, timeout).await;
            }
            Ok(Some(MqttPacket::PingReq(_))) => {
                connection.touch().await;
                handle_pingreq(connection, adapter, timeout).await;
            }
            Ok(Some(MqttPacket::Disconnect(_))) => {
                connection.mark_done();
                return DisconnectType::Normal;
            }
            Ok(Some(_)) => {
                log::debug!("ignoring unexpected packet type from {}", connection.client_id());
            }
            Ok(None) => {
                connection.mark_done();
                return DisconnectType::Dropped;
            }
            Err(err) => {
                if matches!(err.kind(), crate::error::CoreErrorKind::Cancelled) {
                    let disconnect_type = if connection.was_stopped_as_takeover() {
                        DisconnectType::Takeover
                    } else {
                        DisconnectType::Dropped
                    };
                    connection.mark_done();
                    return disconnect_type;
                }

                log::warn!("channel fault for {}: {}", connection.client_id(), err);
                connection.mark_done();
                return DisconnectType::Dropped;
            }
        }
    }
}

fn handle_publish(connection: &Arc<Connection>, dispatch_queue: &DispatchQueue, publish: PublishPacket) {
    dispatch_queue.enqueue(EnqueuedMessage::new(publish, Some(Arc::clone(connection))));
}

async fn handle_subscribe(
    connection: &Arc<Connection>,
    adapter: &Arc<dyn ChannelAdapter>,
    subscribe: mqtt_core::SubscribePacket,
    timeout: std::time::Duration,
) {
    let subs: Vec<_> = subscribe
        .topic_filters()
        .iter()
        .filter_map(|result| match result {
            mqtt_core::topic::TopicFilterResult::Ok(sub) => Some(sub.clone()),
            mqtt_core::topic::TopicFilterResult::Err => None,
        })
        .collect();

    let granted = subs.iter().map(|sub| mqtt_core::qos::SubAckQoS::from(sub.qos())).collect();

    connection.session().subscribe(subs).await;

    let sub_ack = MqttPacket::SubAck(mqtt_core::SubAckPacket::new(subscribe.id(), granted));
    if let Err(err) = adapter.send_packet(&sub_ack, timeout, connection.cancellation()).await {
        log::warn!("failed sending SUBACK to {}: {}", connection.client_id(), err);
    }
}

async fn handle_unsubscribe(
    connection: &Arc<Connection>,
    adapter: &Arc<dyn ChannelAdapter>,
    unsubscribe: mqtt_core::UnsubscribePacket,
    timeout: std::time::Duration,
) {
    connection.session().unsubscribe(unsubscribe.filters()).await;

    let unsub_ack = MqttPacket::UnsubAck(mqtt_core::UnsubAckPacket::new(unsubscribe.id()));
    if let Err(err) = adapter.send_packet(&unsub_ack, timeout, connection.cancellation()).await {
        log::warn!("failed sending UNSUBACK to {}: {}", connection.client_id(), err);
    }
}

async fn handle_pingreq(connection: &Arc<Connection>, adapter: &Arc<dyn ChannelAdapter>, timeout: std::time::Duration) {
    let ping_resp = MqttPacket::PingResp(mqtt_core::PingRespPacket::new());
    if let Err(err) = adapter.send_packet(&ping_resp, timeout, connection.cancellation()).await {
        log::warn!("failed sending PINGRESP to {}: {}", adapter.endpoint(), err);
    }
}

#[cfg(test)]
mod handshake {
    use async_trait::async_trait;
    use mqtt_core::ConnectPacket;

    use super::*;
    use crate::{
        connection::ConnectionRegistry, dispatch::NoopBrokerEvents, session::SessionRegistry,
        transport::tests::NullChannelAdapter,
    };

    struct AssignIdValidator;

    #[async_trait]
    impl ConnectionValidator for AssignIdValidator {
        async fn validate(&self, ctx: &mut ConnectionValidatorContext) {
            ctx.assigned_client_identifier = Some("gen-7".to_string());
        }
    }

    fn test_config() -> BrokerConfig {
        let raw = r#"
            [connection]
            tls = false
            ip = "127.0.0.1"
            port = 1883

            [broker]
            client_id = "server"
            enable_persistent_sessions = false
            default_communication_timeout_ms = 50

            [logger]
            console = false
            file = false
            level = "Off"
        "#;
        return toml::from_str(raw).unwrap();
    }

    /// S4: a v5 CONNECT with an empty client id adopts the validator-assigned
    /// identifier. `mqtt-core`'s wire codec only ever decodes v3.1.1 CONNECTs,
    /// so this branch can't be driven by a real `TcpChannelAdapter`; it's
    /// exercised here against a `NullChannelAdapter` with its protocol version
    /// forced to 5.
    #[tokio::test]
    async fn v5_connect_with_empty_client_id_adopts_assigned_identifier() {
        let connect = ConnectPacket::new(true, 30, String::new(), None, None, None);
        let adapter = Arc::new(NullChannelAdapter::with_inbound("peer", vec![MqttPacket::Connect(connect)]));
        adapter.set_protocol_version(5);
        let adapter: Arc<dyn ChannelAdapter> = adapter;

        let sessions = Arc::new(SessionRegistry::new());
        let connections = Arc::new(ConnectionRegistry::new());
        let takeover = Arc::new(TakeoverCoordinator::new(Arc::clone(&sessions), Arc::clone(&connections)));
        let (dispatch_queue, _receiver) = DispatchQueue::new();
        let cleanup = Arc::new(CleanupPath::new(
            Arc::clone(&sessions),
            Arc::clone(&connections),
            Arc::new(NoopBrokerEvents),
            false,
            std::time::Duration::from_millis(50),
        ));

        let deps = Arc::new(HandshakeDeps {
            config: Arc::new(test_config()),
            validator: Arc::new(AssignIdValidator),
            takeover,
            dispatch_queue,
            events: Arc::new(NoopBrokerEvents),
            cleanup,
            broker_cancel: CancellationToken::new(),
        });

        let connection = run_handshake(&adapter, &deps)
            .await
            .expect("handshake should succeed with the assigned identifier");

        assert_eq!(connection.client_id(), "gen-7");
    }
}
