use core::net::Ipv4Addr;

use std::{
    fs::File,
    io::Read,
    path::Path,
    str::FromStr,
    time::Duration,
};

use log::LevelFilter;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct BrokerConfig {
    connection: Connection,
    broker: Broker,
    logger: Logger,
}

impl BrokerConfig {
    pub fn bind_addr(&self) -> String {
        return self.connection.ip.to_string() + ":" + &self.connection.port.to_string();
    }

    pub fn is_tls_enabled(&self) -> bool {
        return self.connection.tls;
    }

    pub fn should_log_file(&self) -> bool {
        return self.logger.file;
    }

    pub fn should_log_console(&self) -> bool {
        return self.logger.console;
    }

    pub fn client_id(&self) -> &str {
        return &self.broker.client_id;
    }

    pub fn enable_persistent_sessions(&self) -> bool {
        return self.broker.enable_persistent_sessions;
    }

    pub fn default_communication_timeout(&self) -> Duration {
        return Duration::from_millis(self.broker.default_communication_timeout_ms);
    }

    pub fn log_level(&self) -> LevelFilter {
        return LevelFilter::from_str(&self.logger.level).expect(&format!(
            "Invalid log level provided: {}. Accepted levels are: Off, Error, Warn, Info, Debug",
            self.logger.level
        ));
    }
}

impl TryFrom<&Path> for BrokerConfig {
    type Error = toml::de::Error;
    fn try_from(value: &Path) -> Result<Self, toml::de::Error> {
        let mut file = match File::open(value) {
            Ok(file) => file,
            Err(err) => {
                log::warn!(
                    "Could not load file: {} to initialize the configuration.",
                    value.to_str().unwrap_or("")
                );
                log::error!("{err}");
                panic!();
            }
        };

        let mut buf = String::new();
        if let Err(err) = file.read_to_string(&mut buf) {
            log::warn!("Could not read file {}", value.to_str().unwrap_or(""));
            log::error!("{err}");
        }

        let config: BrokerConfig = toml::from_str(&buf)?;

        if config.connection.tls {
            if config.connection.port == 1883 {
                log::warn!("Creating TLS connection on port 1883. This port is reserved for Plaintext MQTT connections.");
            }
        } else if config.connection.port == 8883 {
            log::warn!("Creating Plaintext connection on port 8883. This port is reserved for TLS MQTT connections.");
        }

        return Ok(config);
    }
}

#[derive(Deserialize)]
struct Connection {
    tls: bool,
    ip: Ipv4Addr,
    port: u16,
}

#[derive(Deserialize)]
struct Broker {
    client_id: String,
    enable_persistent_sessions: bool,
    default_communication_timeout_ms: u64,
}

#[derive(Deserialize)]
struct Logger {
    console: bool,
    file: bool,
    level: String,
}
