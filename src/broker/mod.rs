pub mod engine;
pub mod message;
pub mod notify;
pub mod registry;
pub mod state;
pub mod stats;
pub mod topic;

pub use engine::Broker;
pub use message::{Message, QoS};
pub use notify::WakeSignal;
pub use registry::BrokerRegistry;
pub use state::SessionHandle;
pub use stats::{BrokerStats, ClientStats};
pub use topic::{topic_matches, validate_topic};

#[cfg(test)]
mod tests;
