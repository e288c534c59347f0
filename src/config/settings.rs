use serde::Deserialize;

use crate::broker::QoS;
use crate::utils::{MqttError, Result};

/// Top-level configuration settings for the application.
///
/// Includes settings for the shared broker, client sessions and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub client: ClientSettings,
    pub logging: LoggingSettings,
}

/// Name and fixed capacities of the shared broker state.
///
/// Every table is allocated once at broker creation; these limits never grow.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Well-known name clients rendezvous on.
    pub name: String,
    pub max_clients: usize,
    pub log_capacity: usize,
    pub retained_capacity: usize,
    pub max_payload_size: usize,
    pub max_topic_length: usize,
    pub max_client_id_length: usize,
    /// Per-client limit, applied both locally and to the mirrored filters.
    pub max_subscriptions: usize,
}

/// Client session behaviour.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Wait used by `loop_forever` for each `process` call.
    pub poll_interval_ms: u64,
    pub default_qos: u8,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub client: Option<PartialClientSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub name: Option<String>,
    pub max_clients: Option<usize>,
    pub log_capacity: Option<usize>,
    pub retained_capacity: Option<usize>,
    pub max_payload_size: Option<usize>,
    pub max_topic_length: Option<usize>,
    pub max_client_id_length: Option<usize>,
    pub max_subscriptions: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub poll_interval_ms: Option<u64>,
    pub default_qos: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            name: "mqsim_broker".to_string(),
            max_clients: 16,
            log_capacity: 256,
            retained_capacity: 64,
            max_payload_size: 4096,
            max_topic_length: 255,
            max_client_id_length: 63,
            max_subscriptions: 32,
        }
    }
}

impl BrokerSettings {
    /// Reject layouts the broker cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(MqttError::InvalidParameter(
                "broker name must not be empty".to_string(),
            ));
        }
        let limits = [
            ("max_clients", self.max_clients),
            ("log_capacity", self.log_capacity),
            ("retained_capacity", self.retained_capacity),
            ("max_payload_size", self.max_payload_size),
            ("max_topic_length", self.max_topic_length),
            ("max_client_id_length", self.max_client_id_length),
            ("max_subscriptions", self.max_subscriptions),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(MqttError::InvalidParameter(format!(
                    "broker.{field} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

impl ClientSettings {
    /// `default_qos` as a `QoS`; values above 2 are `InvalidParameter`.
    pub fn qos(&self) -> Result<QoS> {
        QoS::try_from(self.default_qos)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            default_qos: 0,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Provides default values for `Settings`.
///
/// The broker limits match the classic shared-memory simulator.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            client: ClientSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
