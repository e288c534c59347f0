//! The `utils` module provides the error type, logging setup and the small
//! helpers (timestamps, generated client ids) used across `mqsim`.

pub mod error;
pub mod logging;

pub use error::{MqttError, Result};

/// Milliseconds since the UNIX epoch.
pub fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a client id of the form `mqsim_<8 hex digits>`.
pub fn generate_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("mqsim_{}", &id[..8])
}
