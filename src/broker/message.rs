//! Message definitions for the broker
//!
//! `Message` is what callbacks receive. QoS is carried as metadata only:
//! the broker always delivers best effort, whatever level was requested.
//!
//! Notes on fields:
//! - `topic`: concrete topic the message was published on
//! - `payload`: raw bytes, bounded by the broker's slot size
//! - `timestamp_ms`: milliseconds since UNIX epoch, set when published
//! - `sequence`: broker-wide sequence number of the publish; gaps mean
//!   entries were overwritten before this client read them

use serde::{Deserialize, Serialize};

use crate::utils::MqttError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

impl TryFrom<u8> for QoS {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(MqttError::InvalidParameter(format!(
                "QoS must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retained: bool,
    pub timestamp_ms: i64,
    pub sequence: u64,
}

impl Message {
    /// Payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
