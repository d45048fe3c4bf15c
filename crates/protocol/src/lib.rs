//! Wire protocol spoken between the hub and its channels.
//!
//! Every WebSocket message is a single JSON object tagged by `type`:
//!
//! - `req`: a named request from a slave or the web API (`RequestFrame`)
//! - `res`: the hub's answer to a request (`ResponseFrame`)
//! - `event`: a server-initiated push: presence notices and direct
//!   invocations of a slave's named address (`EventFrame`)

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Largest inbound frame accepted on a channel (3000 KiB).
pub const MAX_PAYLOAD_BYTES: usize = 3000 * 1024;

// ── Method names ─────────────────────────────────────────────────────────────

/// Request names accepted by the hub.
pub mod methods {
    pub const INIT_SENSOR: &str = "InitSensor";
    pub const INIT_DEVICE: &str = "InitDevice";
    pub const STATUS_CHANGER: &str = "StatusChanger";
    pub const TURN_ON: &str = "TurnOn";
    pub const TURN_OFF: &str = "TurnOff";
    pub const LISTEN_DATA_FROM_SENSOR: &str = "ListenDataFromSensor";
    pub const RETURN_ALL_DEVICES: &str = "ReturnAllDevices";
    pub const RETURN_ALL_SENSORS: &str = "ReturnAllSensors";
    pub const RUN_METHOD: &str = "RunMethod";
    pub const UPDATE_DEVICE: &str = "UpdateDevice";
    pub const UPDATE_SENSOR: &str = "UpdateSensor";
    pub const HEALTH: &str = "health";
    pub const STATUS: &str = "status";
}

/// Event names pushed by the hub.
pub mod events {
    /// Free-text presence notice ("<conn> join." / "<conn> left.").
    pub const NOTICE: &str = "Send";
}

/// Error codes carried in `ErrorShape::code`.
pub mod error_codes {
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
}

// ── Frames ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ErrorShape {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(rename = "type")]
    pub r#type: String,
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RequestFrame {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            r#type: "req".into(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(rename = "type")]
    pub r#type: String,
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: &str, payload: serde_json::Value) -> Self {
        Self {
            r#type: "res".into(),
            id: id.to_string(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: &str, error: ErrorShape) -> Self {
        Self {
            r#type: "res".into(),
            id: id.to_string(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Server push. A `None` payload is the no-argument form of an invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub r#type: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub seq: u64,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Option<serde_json::Value>, seq: u64) -> Self {
        Self {
            r#type: "event".into(),
            event: event.into(),
            payload,
            seq,
        }
    }
}
