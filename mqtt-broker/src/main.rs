mod broker;
mod cleanup;
mod config;
mod connection;
mod dispatch;
mod error;
mod handshake;
mod init;
mod interceptor;
mod logger;
mod retained;
mod session;
mod takeover;
mod transport;
mod validator;

use std::path::PathBuf;

use broker::{Broker, BrokerOptions};
use init::BrokerEnv;
use tokio::net::TcpListener;
use transport::TcpChannelAdapter;

#[tokio::main]
async fn main() {
    let config_path = PathBuf::from("config.toml");
    let env = BrokerEnv::new(&config_path).init_env();
    let config = env.config();

    let bind_addr = config.bind_addr();
    let options = BrokerOptions::new(config);
    let broker = Broker::new(options);

    broker.start().await;

    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("failed to bind {}: {}", bind_addr, err);
            return;
        }
    };

    log::info!("broker listening at {}", bind_addr);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                log::info!("new connection attempt: {}", addr);
                let adapter = std::sync::Arc::new(TcpChannelAdapter::new(stream, addr.to_string()));
                broker.handle_client_connection(adapter);
            }
            Err(err) => {
                log::error!("rejected TCP connection: {}", err);
            }
        }
    }
}
