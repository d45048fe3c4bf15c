use std::fmt;

use {
    chrono::{DateTime, FixedOffset, Utc},
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

// ── Slaves ───────────────────────────────────────────────────────────────────

/// Which registry partition a slave lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaveKind {
    /// Actuator that accepts commands.
    Device,
    /// Telemetry source.
    Sensor,
}

impl SlaveKind {
    /// Lookup order used whenever a MAC is resolved without a kind.
    pub const SEARCH_ORDER: [SlaveKind; 2] = [SlaveKind::Device, SlaveKind::Sensor];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Sensor => "sensor",
        }
    }
}

impl fmt::Display for SlaveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaveStatus {
    #[serde(alias = "On")]
    On,
    #[serde(alias = "Off")]
    Off,
    #[default]
    #[serde(alias = "Unknown")]
    Unknown,
}

impl SlaveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SlaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata describing one connected slave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaveIdentity {
    pub mac: String,
    pub kind: SlaveKind,
    pub name: String,
    pub status: SlaveStatus,
}

impl SlaveIdentity {
    pub fn new(kind: SlaveKind, mac: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mac: mac.into(),
            kind,
            name: name.into(),
            status: SlaveStatus::Unknown,
        }
    }

    pub fn with_status(mut self, status: SlaveStatus) -> Self {
        self.status = status;
        self
    }
}

/// Identity as sent by a slave or the web API. The kind comes from the
/// request name (`InitDevice` vs `InitSensor`), not from the payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaveParams {
    #[serde(alias = "MAC")]
    pub mac: String,
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Status")]
    pub status: SlaveStatus,
}

impl SlaveParams {
    pub fn into_identity(self, kind: SlaveKind) -> SlaveIdentity {
        SlaveIdentity {
            mac: self.mac,
            kind,
            name: self.name,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    #[serde(alias = "MAC", alias = "slaveMac")]
    pub mac: String,
    #[serde(alias = "slaveStatus")]
    pub status: SlaveStatus,
}

// ── Invocations ──────────────────────────────────────────────────────────────

/// A named address on a slave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRef {
    #[serde(alias = "Address")]
    pub address: String,
}

/// Payload of `TurnOn` / `TurnOff`: a slave carrying its on/off addresses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchRequest {
    #[serde(default, alias = "On")]
    pub on: Option<MethodRef>,
    #[serde(default, alias = "Off")]
    pub off: Option<MethodRef>,
}

/// Method half of a `RunMethod` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodCall {
    #[serde(alias = "Address")]
    pub address: String,
    #[serde(default, alias = "Args")]
    pub args: Option<Vec<Value>>,
}

/// Command routed to exactly one slave's channel.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub target_mac: String,
    pub address: String,
    pub args: Vec<Value>,
}

impl InvocationRequest {
    pub fn new(target_mac: impl Into<String>, address: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            target_mac: target_mac.into(),
            address: address.into(),
            args,
        }
    }

    pub fn from_call(target_mac: impl Into<String>, call: MethodCall) -> Self {
        Self::new(target_mac, call.address, call.args.unwrap_or_default())
    }
}

// ── Telemetry ────────────────────────────────────────────────────────────────

/// Telemetry as pushed by a sensor; the timestamp may carry any offset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReading {
    #[serde(alias = "MACSensor", alias = "mac")]
    pub source_mac: String,
    #[serde(alias = "Value")]
    pub value: f64,
    #[serde(alias = "TimeToSend", alias = "timeToSend")]
    pub timestamp: DateTime<FixedOffset>,
}

impl TelemetryReading {
    pub fn into_record(self) -> TelemetryRecord {
        TelemetryRecord {
            source_mac: self.source_mac,
            value: self.value,
            timestamp: self.timestamp.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub source_mac: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}
