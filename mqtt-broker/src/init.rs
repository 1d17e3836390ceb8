use std::{
    fs::{self, File},
    path::Path,
};

use crate::{config::BrokerConfig, logger::BrokerLogger};

pub struct BrokerEnv {
    config: BrokerConfig,
}

impl BrokerEnv {
    pub fn new(config_path: &Path) -> Self {
        match fs::exists(config_path) {
            Ok(true) => {}
            Ok(false) => init_config(config_path),
            Err(err) => {
                panic!("Could not check for config file's existance, {}", err);
            }
        }

        let config = BrokerConfig::try_from(config_path).unwrap();

        return Self { config };
    }

    pub fn init_env(self) -> Self {
        if self.config.should_log_file() || self.config.should_log_console() {
            let level = self.config.log_level();
            BrokerLogger::new(&self.config).init(level).unwrap();
            if self.config.should_log_file() {
                init_log_fs();
            }
        }

        return self;
    }

    // After the env is initialized, all that remains is the config.
    pub fn config(self) -> BrokerConfig {
        return self.config;
    }
}

const FILE_CREATE_ERR: &'static str = "Could not create file: ";

pub fn init_log_fs() {
    let path = Path::new("logs");

    if !fs::exists(path).expect("Could not initialize Log files") {
        fs::create_dir(path).expect("Could not create logs directory");

        let path = path.to_path_buf();

        let debug = path.join("debug.log");
        if let Err(err) = File::create(&debug) {
            log::error!("{FILE_CREATE_ERR}{}\n\t{err}", debug.display());
        }

        let error = path.join("error.log");
        if let Err(err) = File::create(&error) {
            log::debug!("{FILE_CREATE_ERR}{}\n\t{err}", error.display());
            log::error!("{FILE_CREATE_ERR}{}", error.display());
        }

        let main = path.join("main.log");
        if let Err(err) = File::create(&main) {
            log::debug!("{FILE_CREATE_ERR}{}\n\t{err}", main.display());
            log::error!("{FILE_CREATE_ERR}{}", main.display());
        }

        log::info!("Initialized log directory.")
    }
}

pub fn init_config(config_path: &Path) {
    let contents = r#"
[connection]
tls = false
ip = "127.0.0.1"
port = 1883

[broker]
client_id = "broker"
enable_persistent_sessions = true
default_communication_timeout_ms = 5000

[logger]
console = true
file = false
level = "Info"
"#;

    fs::write(config_path, contents).expect("Could not create config file");
    log::info!("Initialized new config file.")
}
