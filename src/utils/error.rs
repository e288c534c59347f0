//! The `error` module defines the error type shared by every broker and
//! client operation.
//!
//! All fallible calls return [`Result`]. Best-effort behaviour (lost wake-ups,
//! log entries overwritten before a slow subscriber reads them) is never
//! reported here; it shows up as gaps in delivered sequence numbers instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MqttError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Out of memory")]
    NoMemory,

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("No available client slots (max {max})")]
    NoAvailableSlots { max: usize },

    #[error("Not connected")]
    NotConnected,

    #[error("Disconnected")]
    Disconnected,

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid topic: '{0}'")]
    TopicInvalid(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MqttError {
    /// Numeric code matching the classic C API of the simulator.
    pub fn code(&self) -> i32 {
        match self {
            MqttError::InvalidParameter(_) => -1,
            MqttError::NoMemory => -2,
            MqttError::ConnectFailed(_) | MqttError::NoAvailableSlots { .. } => -3,
            MqttError::Disconnected => -4,
            MqttError::PublishFailed(_) => -5,
            MqttError::SubscribeFailed(_) => -6,
            MqttError::Timeout => -7,
            MqttError::NotConnected => -9,
            MqttError::TopicInvalid(_) => -10,
            MqttError::PayloadTooLarge { .. } => -11,
            MqttError::Internal(_) => -99,
        }
    }

    /// True for the errors a `connect` can end with.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            MqttError::ConnectFailed(_) | MqttError::NoAvailableSlots { .. }
        )
    }
}
