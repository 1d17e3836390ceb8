use std::{error::Error, fmt::Display};

use mqtt_core::err::{DecodeError, EncodeError};

#[derive(Debug)]
pub struct CoreError {
    kind: CoreErrorKind,
    message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> &CoreErrorKind {
        return &self.kind;
    }
}

impl Error for CoreError {}

impl Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(value: std::io::Error) -> Self {
        return Self {
            kind: CoreErrorKind::Io,
            message: value.to_string(),
        };
    }
}

impl From<DecodeError> for CoreError {
    fn from(value: DecodeError) -> Self {
        return Self {
            kind: CoreErrorKind::Protocol,
            message: value.to_string(),
        };
    }
}

impl From<EncodeError> for CoreError {
    fn from(value: EncodeError) -> Self {
        return Self {
            kind: CoreErrorKind::Protocol,
            message: value.to_string(),
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoreErrorKind {
    /// Non-CONNECT first packet, or an empty client id left unassigned. [MQTT-3.1.0-1]
    Protocol,
    /// Packet read/send/disconnect exceeded `default_communication_timeout`.
    CommunicationTimeout,
    /// The connection validator set a non-success reason code.
    ValidatorRejected,
    /// An underlying I/O fault on the channel adapter.
    Io,
    /// Broker-wide cancellation observed at a suspension point.
    Cancelled,
    /// `subscribe`/`unsubscribe`/`delete_session` against an unknown client id.
    UnknownClient,
    /// Malformed or missing configuration at startup.
    Configuration,
}
