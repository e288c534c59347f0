//! The `client` module defines a participant of the shared broker.
//!
//! It provides the `Client` session (connect, publish, subscribe and the
//! per-client event loop) and the `ConnectOptions` accepted by `connect`.

pub mod options;
pub mod pubsub_client;

pub use options::{ConnectOptions, LastWill};
pub use pubsub_client::{
    Client, ConnectionCallback, ConnectionState, MessageCallback, StopHandle, Subscription,
};
