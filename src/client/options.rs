//! Connection options
//!
//! The fields mirror the network MQTT surface so code can switch backends
//! without changes. This backend ignores the address, port, credentials and
//! keepalive, and accepts a last will without ever publishing it.

use std::time::Duration;

use crate::broker::QoS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub message: String,
    pub qos: QoS,
    pub retained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub broker_address: String,
    pub broker_port: u16,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keepalive_secs: u64,
    /// When false, local subscriptions survive a reconnect and are
    /// registered again with the broker.
    pub clean_session: bool,
    pub connect_timeout: Duration,
    pub last_will: Option<LastWill>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            broker_address: "localhost".to_string(),
            broker_port: 1883,
            client_id: None,
            username: None,
            password: None,
            keepalive_secs: 60,
            clean_session: true,
            connect_timeout: Duration::from_millis(10_000),
            last_will: None,
        }
    }
}

impl ConnectOptions {
    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn with_last_will(mut self, will: LastWill) -> Self {
        self.last_will = Some(will);
        self
    }
}
