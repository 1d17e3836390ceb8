use async_trait::async_trait;
use mqtt_core::{ConnectPacket, ConnectReturnCode};

use crate::session::SessionItems;

/// The mutable record handed to the pluggable validator; consumed once per
/// handshake attempt.
pub struct ConnectionValidatorContext {
    pub connect_packet: ConnectPacket,
    pub endpoint: String,
    pub session_items: SessionItems,
    pub assigned_client_identifier: Option<String>,
    pub reason_code: ConnectReturnCode,
}

impl ConnectionValidatorContext {
    pub fn new(connect_packet: ConnectPacket, endpoint: String) -> Self {
        return Self {
            connect_packet,
            endpoint,
            session_items: SessionItems::new(),
            assigned_client_identifier: None,
            reason_code: ConnectReturnCode::Accept,
        };
    }
}

/// Pluggable authentication/authorization hook invoked once per handshake.
/// May set `reason_code`, `assigned_client_identifier`, and populate
/// `session_items`. The default accepts every connection.
#[async_trait]
pub trait ConnectionValidator: Send + Sync {
    async fn validate(&self, ctx: &mut ConnectionValidatorContext);
}

pub struct AcceptAllValidator;

#[async_trait]
impl ConnectionValidator for AcceptAllValidator {
    async fn validate(&self, _ctx: &mut ConnectionValidatorContext) {}
}

#[cfg(test)]
mod validator {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn accept_all_leaves_reason_code_untouched() {
        let packet = ConnectPacket::new(true, 30, "alice".to_string(), None, None, None::<Bytes>);
        let mut ctx = ConnectionValidatorContext::new(packet, "127.0.0.1:1".to_string());

        AcceptAllValidator.validate(&mut ctx).await;

        assert_eq!(ctx.reason_code, ConnectReturnCode::Accept);
        assert!(ctx.assigned_client_identifier.is_none());
    }
}
