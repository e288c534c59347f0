//! # mqsim
//!
//! `mqsim` is a lightweight publish/subscribe broker for participants that
//! live in the same process. It emulates the MQTT surface (topics, QoS
//! levels, retained messages, `+`/`#` wildcard filters) without any network
//! stack: clients share one broker state guarded by a single lock and are
//! woken through best-effort notifications.
//!
//! ## Core Modules
//!
//! - `broker`: shared state (client table, circular message log, retained
//!   table), topic matching, publish path, wake-ups and named attach points.
//! - `client`: client sessions with local subscriptions and the event loop
//!   that turns new log entries into callbacks.
//! - `config`: loading broker, client and logging settings.
//! - `utils`: the error type, logging setup and small helpers.

pub mod broker;
pub mod client;
pub mod config;
pub mod utils;

pub use broker::{
    Broker, BrokerRegistry, BrokerStats, Message, QoS, topic_matches, validate_topic,
};
pub use client::{Client, ConnectOptions, ConnectionState, LastWill, StopHandle};
pub use config::{BrokerSettings, ClientSettings, Settings, load_config};
pub use utils::{MqttError, Result};

/// Name of this backend, for parity with the network backend.
pub fn backend_name() -> &'static str {
    "In-process simulation (shared state + wake signals)"
}

pub fn version() -> &'static str {
    concat!(env!("CARGO_PKG_VERSION"), "-local")
}
