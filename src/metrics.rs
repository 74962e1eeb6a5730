use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One timestamped reading of host resource metrics.
///
/// Percent fields are in `[0, 100]`. `temperature` is degrees Celsius, with
/// `0.0` standing in when no sensor is readable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub disk_percent: f32,
    pub temperature: f32,
}

/// A discrete operational occurrence recorded in the event log.
///
/// `event_type` and `description` are stored verbatim; validation, if any,
/// is the caller's responsibility.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub timestamp_ms: i64,
    pub event_type: String,
    pub description: String,
}

/// Event types emitted by the surrounding system. Not enforced anywhere.
pub mod event_types {
    pub const ALERT: &str = "alert";
    pub const LOGIN: &str = "login";
    pub const ERROR: &str = "error";
    pub const SERVICE_RESTART: &str = "service_restart";
    pub const SYSTEM_REBOOT: &str = "system_reboot";
    pub const SYSTEM_SHUTDOWN: &str = "system_shutdown";
    pub const SYSTEM_UPDATE: &str = "system_update";
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn now_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}
