mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, ClientSettings, LoggingSettings, Settings};

/// Loads the configuration from `config/default` and `MQSIM_*` environment
/// variables (sections separated by `__`, e.g. `MQSIM_BROKER__MAX_CLIENTS`).
/// Anything not provided falls back to `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("MQSIM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();
    let broker = partial.broker;
    let client = partial.client;
    let logging = partial.logging;

    Ok(Settings {
        broker: BrokerSettings {
            name: broker
                .as_ref()
                .and_then(|b| b.name.clone())
                .unwrap_or(default.broker.name),
            max_clients: broker
                .as_ref()
                .and_then(|b| b.max_clients)
                .unwrap_or(default.broker.max_clients),
            log_capacity: broker
                .as_ref()
                .and_then(|b| b.log_capacity)
                .unwrap_or(default.broker.log_capacity),
            retained_capacity: broker
                .as_ref()
                .and_then(|b| b.retained_capacity)
                .unwrap_or(default.broker.retained_capacity),
            max_payload_size: broker
                .as_ref()
                .and_then(|b| b.max_payload_size)
                .unwrap_or(default.broker.max_payload_size),
            max_topic_length: broker
                .as_ref()
                .and_then(|b| b.max_topic_length)
                .unwrap_or(default.broker.max_topic_length),
            max_client_id_length: broker
                .as_ref()
                .and_then(|b| b.max_client_id_length)
                .unwrap_or(default.broker.max_client_id_length),
            max_subscriptions: broker
                .as_ref()
                .and_then(|b| b.max_subscriptions)
                .unwrap_or(default.broker.max_subscriptions),
        },
        client: ClientSettings {
            poll_interval_ms: client
                .as_ref()
                .and_then(|c| c.poll_interval_ms)
                .unwrap_or(default.client.poll_interval_ms),
            default_qos: client
                .as_ref()
                .and_then(|c| c.default_qos)
                .unwrap_or(default.client.default_qos),
        },
        logging: LoggingSettings {
            level: logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    })
}
